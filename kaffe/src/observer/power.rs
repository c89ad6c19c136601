//! Brewer power sense line.

use kaffe_exporter::MetricDescriptor;
use tracing::info;

use super::{Lifecycle, Observer, Probe};
use crate::error::ObserverError;

/// Reports whether the brewer is switched on.
pub struct PowerObserver {
    name: String,
    probe: Probe,
    descriptor: MetricDescriptor,
    threshold: u16,
    lifecycle: Lifecycle,
}

impl PowerObserver {
    pub fn new(name: String, probe: Probe, metric: String, threshold: u16) -> Self {
        Self {
            name,
            probe,
            descriptor: MetricDescriptor::gauge(
                metric,
                "Whether the brewer is powered (1) or off (0)",
            ),
            threshold,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Observer for PowerObserver {
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
        let on = raw >= self.threshold;
        let value = if on { 1.0 } else { 0.0 };

        if self.descriptor.set(value) != value {
            info!(observer = %self.name, on, raw, "Power state changed");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.lifecycle.stop();
        Ok(())
    }
}
