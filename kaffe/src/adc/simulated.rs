//! Simulated converter for running without hardware.

use super::{AdcTransport, MCP3008_CHANNELS};
use crate::config::SimulatedChannel;
use crate::error::AdcError;

const MAX_RAW: i32 = 1023;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    base: u16,
    ripple: u16,
    tick: u32,
}

/// Deterministic converter: each channel returns its base value plus a
/// triangle wave of `ripple` amplitude. Unconfigured channels read 0.
#[derive(Debug)]
pub struct SimulatedAdc {
    channels: [ChannelState; MCP3008_CHANNELS as usize],
}

impl SimulatedAdc {
    /// Create a simulator from per-channel settings.
    pub fn new(channels: &[SimulatedChannel]) -> Self {
        let mut states = [ChannelState::default(); MCP3008_CHANNELS as usize];
        for channel in channels {
            if let Some(state) = states.get_mut(channel.channel as usize) {
                state.base = channel.value;
                state.ripple = channel.ripple;
            }
        }
        Self { channels: states }
    }
}

impl AdcTransport for SimulatedAdc {
    fn read(&mut self, channel: u8) -> Result<u16, AdcError> {
        let state = self
            .channels
            .get_mut(channel as usize)
            .ok_or(AdcError::InvalidChannel {
                channel,
                channels: MCP3008_CHANNELS,
            })?;

        let ripple = state.ripple as i32;
        let offset = if ripple == 0 {
            0
        } else {
            let period = 4 * ripple as u32;
            let t = (state.tick % period) as i32;
            let triangle = if t < 2 * ripple { t } else { 4 * ripple - t };
            triangle - ripple
        };
        state.tick = state.tick.wrapping_add(1);

        Ok((state.base as i32 + offset).clamp(0, MAX_RAW) as u16)
    }
}
