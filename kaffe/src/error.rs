//! Error types shared by the hardware, observer and alert layers.

use thiserror::Error;

/// Errors from the shared ADC.
#[derive(Error, Debug)]
pub enum AdcError {
    /// The underlying SPI transfer failed.
    #[error("ADC transport error: {0}")]
    Transport(String),

    /// The requested channel does not exist on the converter.
    #[error("ADC channel {channel} out of range (converter has {channels} channels)")]
    InvalidChannel { channel: u8, channels: u8 },

    /// The ADC was closed during shutdown.
    #[error("ADC is closed")]
    Closed,

    /// The hardware cannot be opened on this platform.
    #[error("ADC unsupported: {0}")]
    Unsupported(String),
}

impl AdcError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Errors from delivering alerts or fetching the watched identity.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The HTTP request could not be completed.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote side answered with a failure.
    #[error("{service} rejected the message: {reason}")]
    Rejected { service: String, reason: String },

    /// Local I/O failed (e.g. resolving the outbound address).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifyError {
    /// Create a rejection error.
    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by an observer's worker or poll cycle.
#[derive(Error, Debug)]
pub enum ObserverError {
    /// Reading the shared ADC failed.
    #[error("ADC read failed: {0}")]
    Adc(#[from] AdcError),

    /// The reading could not be turned into a metric value.
    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl ObserverError {
    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adc_error_converts_into_observer_error() {
        let err: ObserverError = AdcError::transport("spi timeout").into();
        assert_eq!(
            err.to_string(),
            "ADC read failed: ADC transport error: spi timeout"
        );
    }

    #[test]
    fn test_invalid_channel_message() {
        let err = AdcError::InvalidChannel {
            channel: 9,
            channels: 8,
        };
        assert!(err.to_string().contains("channel 9"));
    }

    #[test]
    fn test_rejected_message() {
        let err = NotifyError::rejected("slack", "channel_not_found");
        assert_eq!(
            err.to_string(),
            "slack rejected the message: channel_not_found"
        );
    }
}
