//! Water flow through the brewer.
//!
//! The flow sensor has to be sampled far more often than the poll cadence,
//! so this observer does its work in [`Observer::run`]: it reads the flow
//! rate every `sample_interval` and integrates it into a running total.
//! `observe()` only publishes the total.

use std::time::Duration;

use kaffe_exporter::MetricDescriptor;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{Calibration, Lifecycle, Observer, Probe};
use crate::error::ObserverError;

pub struct WaterFlowObserver {
    name: String,
    probe: Probe,
    descriptor: MetricDescriptor,
    calibration: Calibration,
    sample_interval: Duration,
    total_liters: Mutex<f64>,
    lifecycle: Lifecycle,
}

impl WaterFlowObserver {
    pub fn new(
        name: String,
        probe: Probe,
        metric: String,
        calibration: Calibration,
        sample_interval: Duration,
    ) -> Self {
        Self {
            name,
            probe,
            descriptor: MetricDescriptor::gauge(metric, "Water pumped through the brewer in liters"),
            calibration,
            sample_interval,
            total_liters: Mutex::new(0.0),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Liters integrated so far.
    pub fn total_liters(&self) -> f64 {
        *self.total_liters.lock()
    }
}

impl Observer for WaterFlowObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.clone()
    }

    async fn run(&self) -> Result<(), ObserverError> {
        let mut stop = self.lifecycle.subscribe();
        if *stop.borrow_and_update() {
            return Ok(());
        }

        info!(
            observer = %self.name,
            interval_ms = self.sample_interval.as_millis() as u64,
            "Sampling water flow"
        );

        let mut ticker = tokio::time::interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let raw = self.probe.read().await?;
                    let now = Instant::now();
                    let elapsed = now.duration_since(last).as_secs_f64();
                    last = now;

                    let rate = self.calibration.apply(raw);
                    if !rate.is_finite() {
                        return Err(ObserverError::InvalidReading(format!(
                            "channel {} raw {} gives flow {}",
                            self.probe.channel(),
                            raw,
                            rate
                        )));
                    }
                    *self.total_liters.lock() += rate.max(0.0) * elapsed;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(observer = %self.name, total = self.total_liters(), "Flow sampling stopped");
        Ok(())
    }

    async fn observe(&self) -> Result<(), ObserverError> {
        if self.lifecycle.is_stopped() {
            return Ok(());
        }

        let total = self.total_liters();
        self.descriptor.set(total);
        debug!(observer = %self.name, liters = total, "Water flow total");
        Ok(())
    }

    fn stop(&self) -> Result<(), ObserverError> {
        self.lifecycle.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::observer::tests::settable_adc;

    fn flow(probe: Probe) -> Arc<WaterFlowObserver> {
        Arc::new(WaterFlowObserver::new(
            "water_flow".into(),
            probe,
            "kaffe_water_flow_liters_total".into(),
            Calibration::new(0.01, 0.0),
            Duration::from_millis(100),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_integrates_until_stopped() {
        // 100 raw * 0.01 = 1 L/s
        let (adc, _) = settable_adc(100);
        let observer = flow(Probe::new(adc, 4));

        let worker = {
            let observer = observer.clone();
            tokio::spawn(async move { observer.run().await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        observer.observe().await.unwrap();
        observer.stop().unwrap();
        worker.await.unwrap().unwrap();

        let published = observer.descriptor().value();
        assert!((9.5..=10.5).contains(&published), "published {}", published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_rate_is_ignored() {
        let (adc, _) = settable_adc(100);
        let observer = Arc::new(WaterFlowObserver::new(
            "water_flow".into(),
            Probe::new(adc, 4),
            "kaffe_water_flow_liters_total".into(),
            Calibration::new(0.01, -5.0),
            Duration::from_millis(100),
        ));

        let worker = {
            let observer = observer.clone();
            tokio::spawn(async move { observer.run().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        observer.stop().unwrap();
        worker.await.unwrap().unwrap();

        assert_eq!(observer.total_liters(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_rate_ends_run() {
        let (adc, _) = settable_adc(100);
        let observer = Arc::new(WaterFlowObserver::new(
            "water_flow".into(),
            Probe::new(adc, 4),
            "kaffe_water_flow_liters_total".into(),
            Calibration::new(f64::INFINITY, 0.0),
            Duration::from_millis(100),
        ));

        let result = observer.run().await;

        assert!(matches!(result, Err(ObserverError::InvalidReading(_))));
        assert_eq!(observer.total_liters(), 0.0);
    }

    #[tokio::test]
    async fn test_run_after_stop_returns_immediately() {
        let (adc, _) = settable_adc(0);
        let observer = flow(Probe::new(adc, 4));

        observer.stop().unwrap();

        observer.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_error_ends_run() {
        let (adc, _) = settable_adc(0);
        adc.close().await.unwrap();
        let observer = flow(Probe::new(adc, 4));

        let result = observer.run().await;

        assert!(matches!(result, Err(ObserverError::Adc(_))));
    }
}
