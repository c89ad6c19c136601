//! Shared access to the analog-to-digital converter.
//!
//! Every observer reads its sensor through the same converter, and the
//! converter can only run one conversion at a time. [`Adc`] owns the
//! transport behind a single lock; observers hold an [`Arc<Adc>`] and queue
//! on that lock for each read.
//!
//! The physical transfer is a blocking SPI call, so the locked transport is
//! moved onto the blocking pool for the duration of the read. The owned guard
//! travels with it and is released when the read returns, whatever the
//! outcome.

mod mcp3008;
mod simulated;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AdcConfig;
use crate::error::AdcError;

#[cfg(target_os = "linux")]
pub use mcp3008::Mcp3008;
pub use mcp3008::{MCP3008_CHANNELS, decode_response, encode_request};
pub use simulated::SimulatedAdc;

/// A physical (or simulated) converter.
///
/// Implementations perform one blocking conversion per call. They are never
/// called concurrently; [`Adc`] serializes access.
pub trait AdcTransport: Send + 'static {
    /// Convert the given channel and return the raw value.
    fn read(&mut self, channel: u8) -> Result<u16, AdcError>;

    /// Release the underlying device.
    fn close(&mut self) -> Result<(), AdcError> {
        Ok(())
    }
}

struct AdcState {
    transport: Box<dyn AdcTransport>,
    closed: bool,
}

/// Serialized handle to the converter shared by all observers.
pub struct Adc {
    state: Arc<Mutex<AdcState>>,
    channels: u8,
}

/// Shared ownership of the converter.
pub type SharedAdc = Arc<Adc>;

impl Adc {
    /// Wrap a transport exposing `channels` inputs.
    pub fn new(transport: impl AdcTransport, channels: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdcState {
                transport: Box::new(transport),
                closed: false,
            })),
            channels,
        }
    }

    /// Open the converter described by the configuration.
    pub fn open(config: &AdcConfig) -> Result<Self, AdcError> {
        match config {
            AdcConfig::Mcp3008 {
                bus,
                slave_select,
                clock_hz,
            } => {
                let transport = open_mcp3008(*bus, *slave_select, *clock_hz)?;
                info!(bus, slave_select, clock_hz, "Opened MCP3008");
                Ok(Self::new(transport, MCP3008_CHANNELS))
            }
            AdcConfig::Simulated { channels } => {
                info!(channels = channels.len(), "Using simulated ADC");
                Ok(Self::new(SimulatedAdc::new(channels), MCP3008_CHANNELS))
            }
        }
    }

    /// Number of input channels.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Read one channel.
    ///
    /// Waits for exclusive access, performs the conversion and releases the
    /// lock. Transport errors are returned as-is and never retried here.
    pub async fn read(&self, channel: u8) -> Result<u16, AdcError> {
        if channel >= self.channels {
            return Err(AdcError::InvalidChannel {
                channel,
                channels: self.channels,
            });
        }

        let mut state = self.state.clone().lock_owned().await;

        let value = tokio::task::spawn_blocking(move || {
            if state.closed {
                return Err(AdcError::Closed);
            }
            state.transport.read(channel)
        })
        .await
        .map_err(|e| AdcError::transport(format!("read task failed: {}", e)))??;

        debug!(channel, value, "ADC read");
        Ok(value)
    }

    /// Close the converter. Later reads fail with [`AdcError::Closed`].
    pub async fn close(&self) -> Result<(), AdcError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.transport.close()
    }
}

#[cfg(target_os = "linux")]
fn open_mcp3008(bus: u8, slave_select: u8, clock_hz: u32) -> Result<Mcp3008, AdcError> {
    Mcp3008::open(bus, slave_select, clock_hz)
}

#[cfg(not(target_os = "linux"))]
fn open_mcp3008(_bus: u8, _slave_select: u8, _clock_hz: u32) -> Result<SimulatedAdc, AdcError> {
    Err(AdcError::Unsupported(
        "MCP3008 over SPI is only available on Linux".to_string(),
    ))
}
