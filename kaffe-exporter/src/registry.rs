//! Metric descriptors and the process-wide registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use thiserror::Error;
use tracing::{debug, warn};

use crate::mapping::is_valid_metric_name;

/// Errors raised while registering metrics.
///
/// All of these are configuration mistakes and surface at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Metric '{0}' is already registered")]
    Duplicate(String),

    #[error("Invalid metric name '{0}'")]
    InvalidName(String),
}

/// An exported gauge owned by one observer.
///
/// Clones share the underlying value, so the observer keeps one handle to
/// write and the registry keeps another to read during scrapes.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    gauge: Gauge<f64, AtomicU64>,
}

impl MetricDescriptor {
    /// Create a gauge descriptor with an initial value of zero.
    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            gauge: Gauge::default(),
        }
    }

    /// The full metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The HELP text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Swap in a new value, returning the previous one.
    pub fn set(&self, value: f64) -> f64 {
        self.gauge.set(value)
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.gauge.get()
    }
}

/// Registry of every exported metric.
///
/// Populated once while the process initializes, then frozen behind an
/// [`Arc`] and only read by the scrape handler.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    registry: Registry,
    names: Vec<String>,
    seen: HashSet<String>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// Rejects names that are not valid Prometheus names and names that
    /// were registered before.
    pub fn register(&mut self, descriptor: &MetricDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name();

        if !is_valid_metric_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        if !self.seen.insert(name.to_string()) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        self.registry
            .register(name, descriptor.help(), descriptor.gauge.clone());
        self.names.push(name.to_string());

        debug!(metric = %name, "Registered metric");
        Ok(())
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Render all metrics in the OpenMetrics text format.
    pub fn render(&self) -> String {
        let mut output = String::with_capacity(self.names.len() * 128);
        if let Err(e) = encode(&mut output, &self.registry) {
            warn!(error = %e, "Failed to encode metrics");
        }
        output
    }
}

/// Shareable, read-only registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_set_and_value() {
        let descriptor = MetricDescriptor::gauge("kaffe_power_on", "Brewer power state");

        assert_eq!(descriptor.value(), 0.0);
        assert_eq!(descriptor.set(1.0), 0.0);
        assert_eq!(descriptor.value(), 1.0);
    }

    #[test]
    fn test_descriptor_clones_share_value() {
        let descriptor = MetricDescriptor::gauge("kaffe_plate_mode", "Plate mode");
        let reader = descriptor.clone();

        descriptor.set(2.0);

        assert_eq!(reader.value(), 2.0);
    }

    #[test]
    fn test_register_counts_metrics() {
        let mut registry = MetricRegistry::new();
        assert!(registry.is_empty());

        registry
            .register(&MetricDescriptor::gauge("kaffe_a", "a"))
            .unwrap();
        registry
            .register(&MetricDescriptor::gauge("kaffe_b", "b"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), ["kaffe_a", "kaffe_b"]);
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = MetricRegistry::new();
        registry
            .register(&MetricDescriptor::gauge("kaffe_power_on", "first"))
            .unwrap();

        let result = registry.register(&MetricDescriptor::gauge("kaffe_power_on", "second"));

        assert_eq!(
            result,
            Err(RegistryError::Duplicate("kaffe_power_on".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_name() {
        let mut registry = MetricRegistry::new();

        let result = registry.register(&MetricDescriptor::gauge("water level", "bad"));

        assert!(matches!(result, Err(RegistryError::InvalidName(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_render_reflects_current_values() {
        let mut registry = MetricRegistry::new();
        let descriptor =
            MetricDescriptor::gauge("kaffe_plate_temperature_celsius", "Hot plate temperature");
        registry.register(&descriptor).unwrap();

        descriptor.set(42.5);
        let output = registry.render();

        assert!(output.contains("# TYPE kaffe_plate_temperature_celsius gauge"));
        assert!(output.contains("kaffe_plate_temperature_celsius 42.5"));

        descriptor.set(80.25);
        let output = registry.render();

        assert!(output.contains("kaffe_plate_temperature_celsius 80.25"));
    }
}
