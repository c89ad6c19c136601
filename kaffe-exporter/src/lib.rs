//! Metric registry and Prometheus scrape endpoint for KAFFE.
//!
//! Observers own [`MetricDescriptor`]s whose values are updated lock-free.
//! Every descriptor is registered once into a [`MetricRegistry`] at startup,
//! and the [`HttpServer`] renders the registry on each scrape.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Observers    │────>│ MetricRegistry  │────>│   HTTP Server   │
//! │ (atomic gauges) │     │  (startup only) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod mapping;
pub mod registry;

pub use config::{ConfigError, MetricsConfig};
pub use http::HttpServer;
pub use registry::{MetricDescriptor, MetricRegistry, RegistryError, SharedRegistry};
