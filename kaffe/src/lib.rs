//! KAFFE: coffee machine hardware observers.
//!
//! A fixed set of observers (water level, hot plate temperature and mode,
//! power, water flow) share one MCP3008 converter. Their readings are
//! exported as Prometheus gauges, and low water is reported on a webhook.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────┐
//!                │  Supervisor  │──── first failure / SIGTERM ──> drain
//!                └──────┬───────┘
//!         worker + poller per observer
//!        ┌──────────────┼──────────────┐
//!        v              v              v
//!   ┌─────────┐    ┌─────────┐    ┌─────────┐
//!   │Observer │    │Observer │    │Observer │──> MetricDescriptor ──> /metrics
//!   └────┬────┘    └────┬────┘    └────┬────┘
//!        └──────────────┼──────────────┘
//!                       v
//!                ┌──────────────┐
//!                │  Adc (lock)  │
//!                └──────────────┘
//! ```
//!
//! - [`adc`] - Serialized access to the shared converter
//! - [`observer`] - The observer trait and the concrete sensors
//! - [`supervisor`] - Task lifecycle, failure signal and drain
//! - [`alert`] - Webhook and Slack notifiers, outbound IP watcher
//! - [`config`] - Configuration loading (JSON5 format)

pub mod adc;
pub mod alert;
pub mod app;
pub mod args;
pub mod config;
pub mod error;
pub mod logging;
pub mod observer;
pub mod supervisor;

pub use config::KaffeConfig;
pub use error::{AdcError, NotifyError, ObserverError};
pub use observer::{Observer, Sensor};
pub use supervisor::{DrainReport, ShutdownCause, Supervisor, TaskFailure, TaskKind};
