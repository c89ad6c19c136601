//! Configuration for the KAFFE daemon.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use kaffe_exporter::MetricsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adc::MCP3008_CHANNELS;
use crate::logging::LoggingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<kaffe_exporter::ConfigError> for ConfigError {
    fn from(err: kaffe_exporter::ConfigError) -> Self {
        match err {
            kaffe_exporter::ConfigError::Validation(msg) => Self::Validation(msg),
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaffeConfig {
    /// Converter the observers share
    #[serde(default)]
    pub adc: AdcConfig,

    /// Enabled observers, in registration order
    pub observers: Vec<ObserverConfig>,

    /// Metrics endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Task scheduling
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Alert delivery
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Converter selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdcConfig {
    /// MCP3008 on the Raspberry Pi SPI bus
    Mcp3008 {
        /// SPI bus number (default: 0)
        #[serde(default)]
        bus: u8,
        /// Chip select line (default: 0)
        #[serde(default)]
        slave_select: u8,
        /// SPI clock in Hz (default: 1 MHz)
        #[serde(default = "default_clock_hz")]
        clock_hz: u32,
    },
    /// Deterministic fake converter for development
    Simulated {
        #[serde(default)]
        channels: Vec<SimulatedChannel>,
    },
}

fn default_clock_hz() -> u32 {
    1_000_000
}

impl Default for AdcConfig {
    fn default() -> Self {
        AdcConfig::Mcp3008 {
            bus: 0,
            slave_select: 0,
            clock_hz: default_clock_hz(),
        }
    }
}

/// One channel of the simulated converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedChannel {
    pub channel: u8,
    /// Base raw value (0-1023)
    pub value: u16,
    /// Triangle wave amplitude around the base value
    #[serde(default)]
    pub ripple: u16,
}

/// Scheduling of observer tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between `observe()` calls on each observer
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds to wait for tasks after stopping observers
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Webhook receiving observer alerts (hubot)
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// Slack bot announcing the outbound IP
    #[serde(default)]
    pub slack: Option<SlackConfig>,

    /// Seconds between outbound IP checks
    #[serde(default = "default_ip_watch_interval")]
    pub ip_watch_interval_secs: u64,

    /// Seconds before an alert request is abandoned
    #[serde(default = "default_alert_timeout")]
    pub timeout_secs: u64,
}

fn default_ip_watch_interval() -> u64 {
    60
}

fn default_alert_timeout() -> u64 {
    5
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            slack: None,
            ip_watch_interval_secs: default_ip_watch_interval(),
            timeout_secs: default_alert_timeout(),
        }
    }
}

/// Alert webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub token: String,
}

/// Slack bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub token: String,
    #[serde(default = "default_slack_channel")]
    pub channel: String,
}

pub(crate) fn default_slack_channel() -> String {
    "#general".to_string()
}

/// An enabled observer and its calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObserverConfig {
    WaterContainer(WaterContainerConfig),
    PlateTemperature(PlateTemperatureConfig),
    Power(PowerConfig),
    PlateMode(PlateModeConfig),
    WaterFlow(WaterFlowConfig),
}

impl ObserverConfig {
    /// Kind identifier as written in the configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            ObserverConfig::WaterContainer(_) => "water_container",
            ObserverConfig::PlateTemperature(_) => "plate_temperature",
            ObserverConfig::Power(_) => "power",
            ObserverConfig::PlateMode(_) => "plate_mode",
            ObserverConfig::WaterFlow(_) => "water_flow",
        }
    }

    /// Observer name, defaulting to its kind.
    pub fn name(&self) -> String {
        let name = match self {
            ObserverConfig::WaterContainer(c) => &c.name,
            ObserverConfig::PlateTemperature(c) => &c.name,
            ObserverConfig::Power(c) => &c.name,
            ObserverConfig::PlateMode(c) => &c.name,
            ObserverConfig::WaterFlow(c) => &c.name,
        };
        name.clone().unwrap_or_else(|| self.kind().to_string())
    }

    /// ADC channel the observer reads.
    pub fn channel(&self) -> u8 {
        match self {
            ObserverConfig::WaterContainer(c) => c.channel,
            ObserverConfig::PlateTemperature(c) => c.channel,
            ObserverConfig::Power(c) => c.channel,
            ObserverConfig::PlateMode(c) => c.channel,
            ObserverConfig::WaterFlow(c) => c.channel,
        }
    }
}

/// Water container level sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterContainerConfig {
    pub name: Option<String>,
    pub channel: u8,
    /// Metric base name override
    pub metric: Option<String>,
    /// Liters per raw unit
    #[serde(default = "default_level_scale")]
    pub scale: f64,
    /// Liters at raw 0
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_capacity")]
    pub capacity_liters: f64,
    /// Weight of the newest reading in the moving average (0, 1]
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    /// Alert when the level drops below this
    #[serde(default = "default_low_level")]
    pub low_level_liters: f64,
    /// Re-arm the alert once the level is back above this
    #[serde(default = "default_refill_level")]
    pub refill_level_liters: f64,
}

fn default_level_scale() -> f64 {
    1.25 / 1023.0
}

fn default_capacity() -> f64 {
    1.25
}

fn default_smoothing() -> f64 {
    0.3
}

fn default_low_level() -> f64 {
    0.2
}

fn default_refill_level() -> f64 {
    0.5
}

/// Hot plate temperature sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateTemperatureConfig {
    pub name: Option<String>,
    pub channel: u8,
    pub metric: Option<String>,
    /// Degrees Celsius per raw unit (LM35 on 3.3 V reference)
    #[serde(default = "default_temperature_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_temperature_scale() -> f64 {
    330.0 / 1023.0
}

/// Brewer power sense line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    pub name: Option<String>,
    pub channel: u8,
    pub metric: Option<String>,
    /// Raw value at or above which the brewer counts as powered
    #[serde(default = "default_power_threshold")]
    pub threshold: u16,
}

fn default_power_threshold() -> u16 {
    512
}

/// Hot plate mode selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateModeConfig {
    pub name: Option<String>,
    pub channel: u8,
    pub metric: Option<String>,
    /// Raw value at or above which the plate is keeping warm
    #[serde(default = "default_warm_threshold")]
    pub warm_threshold: u16,
    /// Raw value at or above which the plate is brewing
    #[serde(default = "default_brew_threshold")]
    pub brew_threshold: u16,
}

fn default_warm_threshold() -> u16 {
    300
}

fn default_brew_threshold() -> u16 {
    700
}

/// Water flow sensor, sampled continuously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterFlowConfig {
    pub name: Option<String>,
    pub channel: u8,
    pub metric: Option<String>,
    /// Liters per second per raw unit
    #[serde(default = "default_flow_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    /// Milliseconds between samples in the worker
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

fn default_flow_scale() -> f64 {
    0.0001
}

fn default_sample_interval() -> u64 {
    100
}

impl KaffeConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON5 file without validating it, so that
    /// command-line overrides can be applied first.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: KaffeConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.observers.is_empty() {
            return Err(ConfigError::Validation(
                "At least one observer must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for observer in &self.observers {
            let name = observer.name();

            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "Observer name cannot be empty".to_string(),
                ));
            }

            if !names.insert(name.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate observer name '{}'",
                    name
                )));
            }

            if observer.channel() >= MCP3008_CHANNELS {
                return Err(ConfigError::Validation(format!(
                    "Observer '{}': channel {} out of range (0-{})",
                    name,
                    observer.channel(),
                    MCP3008_CHANNELS - 1
                )));
            }

            validate_observer(&name, observer)?;
        }

        if let AdcConfig::Simulated { channels } = &self.adc {
            for channel in channels {
                if channel.channel >= MCP3008_CHANNELS {
                    return Err(ConfigError::Validation(format!(
                        "Simulated channel {} out of range",
                        channel.channel
                    )));
                }
            }
        }

        if self.supervisor.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.alerts.ip_watch_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "ip_watch_interval_secs must be > 0".to_string(),
            ));
        }

        if self.alerts.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "alerts timeout_secs must be > 0".to_string(),
            ));
        }

        if let Some(webhook) = &self.alerts.webhook {
            if webhook.url.is_empty() || webhook.token.is_empty() {
                return Err(ConfigError::Validation(
                    "The webhook url and token cannot be empty".to_string(),
                ));
            }
        }

        self.metrics.validate()?;

        Ok(())
    }

    /// Limit for one alert request.
    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alerts.timeout_secs)
    }

    /// Slack settings, if the outbound IP watcher should run.
    pub fn ip_watcher(&self) -> Option<&SlackConfig> {
        self.alerts
            .slack
            .as_ref()
            .filter(|slack| !slack.token.is_empty() && !slack.channel.is_empty())
    }
}

fn validate_observer(name: &str, observer: &ObserverConfig) -> Result<(), ConfigError> {
    let invalid = |msg: &str| ConfigError::Validation(format!("Observer '{}': {}", name, msg));

    match observer {
        ObserverConfig::WaterContainer(c) => {
            if !(c.smoothing > 0.0 && c.smoothing <= 1.0) {
                return Err(invalid("smoothing must be in (0, 1]"));
            }
            if c.capacity_liters <= 0.0 {
                return Err(invalid("capacity_liters must be > 0"));
            }
            if c.low_level_liters >= c.refill_level_liters {
                return Err(invalid(
                    "low_level_liters must be below refill_level_liters",
                ));
            }
        }
        ObserverConfig::PlateMode(c) => {
            if c.warm_threshold >= c.brew_threshold {
                return Err(invalid("warm_threshold must be below brew_threshold"));
            }
        }
        ObserverConfig::WaterFlow(c) => {
            if c.sample_interval_ms == 0 {
                return Err(invalid("sample_interval_ms must be > 0"));
            }
        }
        ObserverConfig::PlateTemperature(_) | ObserverConfig::Power(_) => {}
    }

    Ok(())
}
