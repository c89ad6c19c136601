//! MCP3008 10-bit converter on the Raspberry Pi SPI bus.

#[cfg(target_os = "linux")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

#[cfg(target_os = "linux")]
use super::AdcTransport;
#[cfg(target_os = "linux")]
use crate::error::AdcError;

/// Number of single-ended inputs on an MCP3008.
pub const MCP3008_CHANNELS: u8 = 8;

/// Build the 3-byte request for a single-ended conversion.
///
/// Start bit, then single-ended mode and the channel in the high nibble.
pub fn encode_request(channel: u8) -> [u8; 3] {
    [0x01, (0x08 | (channel & 0x07)) << 4, 0x00]
}

/// Extract the 10-bit result from the 3-byte response.
pub fn decode_response(response: &[u8; 3]) -> u16 {
    (((response[1] & 0x03) as u16) << 8) | response[2] as u16
}

/// MCP3008 attached to a Linux spidev bus.
#[cfg(target_os = "linux")]
pub struct Mcp3008 {
    spi: Spi,
}

#[cfg(target_os = "linux")]
impl Mcp3008 {
    /// Open the converter on the given bus and chip select, in SPI mode 0.
    pub fn open(bus: u8, slave_select: u8, clock_hz: u32) -> Result<Self, AdcError> {
        let bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            other => {
                return Err(AdcError::Unsupported(format!("SPI bus {}", other)));
            }
        };
        let slave_select = match slave_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => {
                return Err(AdcError::Unsupported(format!("SPI chip select {}", other)));
            }
        };

        let spi = Spi::new(bus, slave_select, clock_hz, Mode::Mode0)
            .map_err(|e| AdcError::transport(format!("SPI open failed: {}", e)))?;

        Ok(Self { spi })
    }
}

#[cfg(target_os = "linux")]
impl AdcTransport for Mcp3008 {
    fn read(&mut self, channel: u8) -> Result<u16, AdcError> {
        let request = encode_request(channel);
        let mut response = [0u8; 3];

        self.spi
            .transfer(&mut response, &request)
            .map_err(|e| AdcError::transport(e.to_string()))?;

        Ok(decode_response(&response))
    }
}
