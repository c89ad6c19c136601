//! Hardware observers.
//!
//! Each observer watches one physical quantity on one ADC channel and owns
//! the gauge it is exported as. The supervisor drives every observer through
//! the [`Observer`] trait: one long-lived [`Observer::run`] task and one
//! periodic [`Observer::observe`] call.
//!
//! The configured set is built into [`Sensor`] values, a sum type over the
//! concrete observers.

mod plate_mode;
mod plate_temperature;
mod power;
mod water_container;
mod water_flow;

use std::future::Future;

use kaffe_exporter::MetricDescriptor;
use kaffe_exporter::mapping::build_metric_name;
use tokio::sync::watch;

use crate::adc::SharedAdc;
use crate::alert::WebhookNotifier;
use crate::config::{KaffeConfig, ObserverConfig};
use crate::error::{NotifyError, ObserverError};

pub use plate_mode::{PlateMode, PlateModeObserver};
pub use plate_temperature::PlateTemperatureObserver;
pub use power::PowerObserver;
pub use water_container::WaterContainerObserver;
pub use water_flow::WaterFlowObserver;

/// A unit monitoring one physical quantity.
///
/// Implementations synchronize their own state: the supervisor may run
/// `run()` and `observe()` at the same time.
pub trait Observer: Send + Sync + 'static {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// The descriptor this observer writes to.
    fn descriptor(&self) -> MetricDescriptor;

    /// Long-lived background work. Returns after `stop()` or on an
    /// unrecoverable error. Observers without continuous sampling return
    /// immediately.
    fn run(&self) -> impl Future<Output = Result<(), ObserverError>> + Send {
        async { Ok(()) }
    }

    /// One sampling cycle.
    fn observe(&self) -> impl Future<Output = Result<(), ObserverError>> + Send;

    /// Stop the observer. Safe to call more than once.
    fn stop(&self) -> Result<(), ObserverError>;
}

/// Linear conversion from a raw reading to a physical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
}

impl Calibration {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    pub fn apply(&self, raw: u16) -> f64 {
        raw as f64 * self.scale + self.offset
    }
}

/// One channel on the shared converter.
#[derive(Clone)]
pub struct Probe {
    adc: SharedAdc,
    channel: u8,
}

impl Probe {
    pub fn new(adc: SharedAdc, channel: u8) -> Self {
        Self { adc, channel }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Read the raw value through the shared lock.
    pub async fn read(&self) -> Result<u16, ObserverError> {
        Ok(self.adc.read(self.channel).await?)
    }
}

/// Stopped flag that workers can also wait on.
pub(crate) struct Lifecycle {
    stop: watch::Sender<bool>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            stop: watch::Sender::new(false),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Mark stopped. Returns `true` on the first call only.
    pub(crate) fn stop(&self) -> bool {
        !self.stop.send_replace(true)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}

/// The configured observers.
pub enum Sensor {
    WaterContainer(WaterContainerObserver<WebhookNotifier>),
    PlateTemperature(PlateTemperatureObserver),
    Power(PowerObserver),
    PlateMode(PlateModeObserver),
    WaterFlow(WaterFlowObserver),
}

impl Sensor {
    /// Build one observer from its configuration.
    pub fn from_config(
        config: &ObserverConfig,
        adc: SharedAdc,
        prefix: &str,
        webhook: Option<WebhookNotifier>,
    ) -> Self {
        let name = config.name();
        let probe = Probe::new(adc, config.channel());
        let metric = |custom: &Option<String>, default: &str| {
            build_metric_name(prefix, custom.as_deref().unwrap_or(default))
        };

        match config {
            ObserverConfig::WaterContainer(c) => Sensor::WaterContainer(
                WaterContainerObserver::new(
                    name,
                    probe,
                    metric(&c.metric, "water_container_liters"),
                    c,
                )
                .with_notifier(webhook),
            ),
            ObserverConfig::PlateTemperature(c) => {
                Sensor::PlateTemperature(PlateTemperatureObserver::new(
                    name,
                    probe,
                    metric(&c.metric, "plate_temperature_celsius"),
                    Calibration::new(c.scale, c.offset),
                ))
            }
            ObserverConfig::Power(c) => Sensor::Power(PowerObserver::new(
                name,
                probe,
                metric(&c.metric, "power_on"),
                c.threshold,
            )),
            ObserverConfig::PlateMode(c) => Sensor::PlateMode(PlateModeObserver::new(
                name,
                probe,
                metric(&c.metric, "plate_mode"),
                c.warm_threshold,
                c.brew_threshold,
            )),
            ObserverConfig::WaterFlow(c) => Sensor::WaterFlow(WaterFlowObserver::new(
                name,
                probe,
                metric(&c.metric, "water_flow_liters_total"),
                Calibration::new(c.scale, c.offset),
                std::time::Duration::from_millis(c.sample_interval_ms),
            )),
        }
    }
}

/// Build every configured observer, in configuration order, bound to `adc`.
///
/// Fails only when the alert webhook client cannot be created.
pub fn build_sensors(
    config: &KaffeConfig,
    adc: &SharedAdc,
) -> Result<Vec<Sensor>, NotifyError> {
    let webhook = config
        .alerts
        .webhook
        .as_ref()
        .map(|w| WebhookNotifier::new(&w.url, &w.token, config.alert_timeout()))
        .transpose()?;

    Ok(config
        .observers
        .iter()
        .map(|observer| {
            Sensor::from_config(
                observer,
                adc.clone(),
                &config.metrics.prefix,
                webhook.clone(),
            )
        })
        .collect())
}

impl Observer for Sensor {
    fn name(&self) -> &str {
        match self {
            Sensor::WaterContainer(o) => o.name(),
            Sensor::PlateTemperature(o) => o.name(),
            Sensor::Power(o) => o.name(),
            Sensor::PlateMode(o) => o.name(),
            Sensor::WaterFlow(o) => o.name(),
        }
    }

    fn descriptor(&self) -> MetricDescriptor {
        match self {
            Sensor::WaterContainer(o) => o.descriptor(),
            Sensor::PlateTemperature(o) => o.descriptor(),
            Sensor::Power(o) => o.descriptor(),
            Sensor::PlateMode(o) => o.descriptor(),
            Sensor::WaterFlow(o) => o.descriptor(),
        }
    }

    async fn run(&self) -> Result<(), ObserverError> {
        match self {
            Sensor::WaterContainer(o) => o.run().await,
            Sensor::PlateTemperature(o) => o.run().await,
            Sensor::Power(o) => o.run().await,
            Sensor::PlateMode(o) => o.run().await,
            Sensor::WaterFlow(o) => o.run().await,
        }
    }

    async fn observe(&self) -> Result<(), ObserverError> {
        match self {
            Sensor::WaterContainer(o) => o.observe().await,
            Sensor::PlateTemperature(o) => o.observe().await,
            Sensor::Power(o) => o.observe().await,
            Sensor::PlateMode(o) => o.observe().await,
            Sensor::WaterFlow(o) => o.observe().await,
        }
    }

    fn stop(&self) -> Result<(), ObserverError> {
        match self {
            Sensor::WaterContainer(o) => o.stop(),
            Sensor::PlateTemperature(o) => o.stop(),
            Sensor::Power(o) => o.stop(),
            Sensor::PlateMode(o) => o.stop(),
            Sensor::WaterFlow(o) => o.stop(),
        }
    }
}
