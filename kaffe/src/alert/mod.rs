//! Alert delivery and the outbound identity watcher.
//!
//! Observers raise alerts through a [`Notifier`]; the [`IdentityWatcher`]
//! polls an [`IdentitySource`] and announces changes through another one.
//! Nothing in this module reports to the supervisor: delivery and fetch
//! failures are logged and dropped.

mod outbound_ip;
mod slack;
mod watcher;
mod webhook;

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::NotifyError;

pub use outbound_ip::OutboundIp;
pub use slack::SlackNotifier;
pub use watcher::IdentityWatcher;
pub use webhook::WebhookNotifier;

/// Default limit for one alert request, connect to last body byte.
pub const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client whose requests give up after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, NotifyError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// A channel that delivers free-form text messages.
pub trait Notifier: Send + Sync + 'static {
    /// Short service name for logs.
    fn service(&self) -> &str;

    /// Deliver one message. Only success or failure of the request matters.
    fn notify(&self, message: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// An external value the watcher compares between checks.
pub trait IdentitySource: Send + Sync + 'static {
    type Value: PartialEq + Display + Clone + Send + Sync + 'static;

    /// Fetch the current value.
    fn current(&self) -> impl Future<Output = Result<Self::Value, NotifyError>> + Send;
}
