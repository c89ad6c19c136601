//! Hot plate mode selector.

use std::fmt;

use kaffe_exporter::MetricDescriptor;
use tracing::info;

use super::{Lifecycle, Observer, Probe};
use crate::error::ObserverError;

/// Position of the hot plate switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateMode {
    Off,
    KeepWarm,
    Brewing,
}

impl PlateMode {
    /// Classify a raw reading.
    pub fn classify(raw: u16, warm_threshold: u16, brew_threshold: u16) -> Self {
        if raw >= brew_threshold {
            PlateMode::Brewing
        } else if raw >= warm_threshold {
            PlateMode::KeepWarm
        } else {
            PlateMode::Off
        }
    }

    /// Exported gauge value.
    pub fn as_f64(self) -> f64 {
        match self {
            PlateMode::Off => 0.0,
            PlateMode::KeepWarm => 1.0,
            PlateMode::Brewing => 2.0,
        }
    }
}

impl fmt::Display for PlateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlateMode::Off => write!(f, "off"),
            PlateMode::KeepWarm => write!(f, "keep-warm"),
            PlateMode::Brewing => write!(f, "brewing"),
        }
    }
}

pub struct PlateModeObserver {
    name: String,
    probe: Probe,
    descriptor: MetricDescriptor,
    warm_threshold: u16,
    brew_threshold: u16,
    lifecycle: Lifecycle,
}

impl PlateModeObserver {
    pub fn new(
        name: String,
        probe: Probe,
        metric: String,
        warm_threshold: u16,
        brew_threshold: u16,
    ) -> Self {
        Self {
            name,
            probe,
            descriptor: MetricDescriptor::gauge(
                metric,
                "Hot plate mode (0 off, 1 keep warm, 2 brewing)",
            ),
            warm_threshold,
            brew_threshold,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Observer for PlateModeObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.clone()
    }

    async fn observe(&self) -> Result<(), ObserverError> {
        if self.lifecycle.is_stopped() {
            return Ok(());
        }

        let raw = self.probe.read().await?;
        let mode = PlateMode::classify(raw, self.warm_threshold, self.brew_threshold);

        if self.descriptor.set(mode.as_f64()) != mode.as_f64() {
            info!(observer = %self.name, %mode, raw, "Plate mode changed");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.lifecycle.stop();
        Ok(())
    }
}
