//! Water container level.
//!
//! The level sensor is noisy while the brewer pumps, so readings are
//! clamped to the container's capacity and smoothed with an exponential
//! moving average before they are exported. A low-level alert fires once
//! when the smoothed level drops below `low_level_liters` and is re-armed
//! when the container is refilled past `refill_level_liters`.

use kaffe_exporter::MetricDescriptor;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Calibration, Lifecycle, Observer, Probe};
use crate::alert::Notifier;
use crate::config::WaterContainerConfig;
use crate::error::ObserverError;

#[derive(Debug, Default)]
struct LevelState {
    smoothed: Option<f64>,
    alerted: bool,
}

pub struct WaterContainerObserver<N: Notifier> {
    name: String,
    probe: Probe,
    descriptor: MetricDescriptor,
    calibration: Calibration,
    capacity: f64,
    smoothing: f64,
    low_level: f64,
    refill_level: f64,
    state: Mutex<LevelState>,
    notifier: Option<N>,
    lifecycle: Lifecycle,
}

impl<N: Notifier> WaterContainerObserver<N> {
    pub fn new(name: String, probe: Probe, metric: String, config: &WaterContainerConfig) -> Self {
        Self {
            name,
            probe,
            descriptor: MetricDescriptor::gauge(metric, "Water left in the container in liters"),
            calibration: Calibration::new(config.scale, config.offset),
            capacity: config.capacity_liters,
            smoothing: config.smoothing,
            low_level: config.low_level_liters,
            refill_level: config.refill_level_liters,
            state: Mutex::new(LevelState::default()),
            notifier: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Send low-level alerts through `notifier`.
    pub fn with_notifier(mut self, notifier: Option<N>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Fold one level into the average and decide whether to alert.
    fn update(&self, level: f64) -> (f64, bool) {
        let mut state = self.state.lock();

        let smoothed = match state.smoothed {
            Some(previous) => previous + self.smoothing * (level - previous),
            None => level,
        };
        state.smoothed = Some(smoothed);

        let mut alert = false;
        if !state.alerted && smoothed < self.low_level {
            state.alerted = true;
            alert = true;
        } else if state.alerted && smoothed >= self.refill_level {
            state.alerted = false;
            info!(observer = %self.name, liters = smoothed, "Water container refilled");
        }

        (smoothed, alert)
    }
}

impl<N: Notifier> Observer for WaterContainerObserver<N> {
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
        let level = self.calibration.apply(raw);
        if level.is_nan() {
            return Err(ObserverError::InvalidReading(format!(
                "channel {} raw {} gives NaN",
                self.probe.channel(),
                raw
            )));
        }

        let (smoothed, alert) = self.update(level.clamp(0.0, self.capacity));
        self.descriptor.set(smoothed);
        debug!(observer = %self.name, raw, liters = smoothed, "Water level");

        if alert {
            warn!(observer = %self.name, liters = smoothed, "Water container is running low");
            if let Some(notifier) = &self.notifier {
                let message = format!(
                    "The coffee machine is running low on water ({:.2} L left)",
                    smoothed
                );
                if let Err(e) = notifier.notify(&message).await {
                    warn!(
                        observer = %self.name,
                        service = notifier.service(),
                        error = %e,
                        "Could not deliver low water alert"
                    );
                }
            }
        }

        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.lifecycle.stop();
        Ok(())
    }
}
