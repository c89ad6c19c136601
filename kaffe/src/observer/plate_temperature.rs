//! Hot plate temperature.

use kaffe_exporter::MetricDescriptor;
use tracing::debug;

use super::{Calibration, Lifecycle, Observer, Probe};
use crate::error::ObserverError;

pub struct PlateTemperatureObserver {
    name: String,
    probe: Probe,
    descriptor: MetricDescriptor,
    calibration: Calibration,
    lifecycle: Lifecycle,
}

impl PlateTemperatureObserver {
    pub fn new(name: String, probe: Probe, metric: String, calibration: Calibration) -> Self {
        Self {
            name,
            probe,
            descriptor: MetricDescriptor::gauge(
                metric,
                "Hot plate temperature in degrees Celsius",
            ),
            calibration,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Observer for PlateTemperatureObserver {
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
        let celsius = self.calibration.apply(raw);
        if !celsius.is_finite() {
            return Err(ObserverError::InvalidReading(format!(
                "channel {} raw {} gives {}",
                self.probe.channel(),
                raw,
                celsius
            )));
        }

        self.descriptor.set(celsius);
        debug!(observer = %self.name, raw, celsius, "Plate temperature");
        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.lifecycle.stop();
        Ok(())
    }
}
