//! Periodic identity watcher.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{IdentitySource, Notifier};

/// Polls an identity source and announces every change.
///
/// The last seen value lives only in memory. A value is recorded as seen
/// once a notification has been attempted, whether or not it was delivered.
pub struct IdentityWatcher<S: IdentitySource, N: Notifier> {
    source: S,
    notifier: N,
    interval: Duration,
    last_seen: Option<S::Value>,
}

impl<S: IdentitySource, N: Notifier> IdentityWatcher<S, N> {
    pub fn new(source: S, notifier: N, interval: Duration) -> Self {
        Self {
            source,
            notifier,
            interval,
            last_seen: None,
        }
    }

    /// Start from a known value instead of an empty history.
    pub fn with_last_seen(mut self, value: S::Value) -> Self {
        self.last_seen = Some(value);
        self
    }

    /// Last value a notification was attempted for.
    pub fn last_seen(&self) -> Option<&S::Value> {
        self.last_seen.as_ref()
    }

    /// Run one check. Returns `true` if a notification was attempted.
    pub async fn check_once(&mut self) -> bool {
        let current = match self.source.current().await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Could not fetch watched identity");
                return false;
            }
        };

        if self.last_seen.as_ref() == Some(&current) {
            debug!(value = %current, "Identity unchanged");
            return false;
        }

        info!(value = %current, service = self.notifier.service(), "Identity changed");
        let message = format!("KAFFE is running at {}", current);
        if let Err(e) = self.notifier.notify(&message).await {
            warn!(
                error = %e,
                service = self.notifier.service(),
                "Could not announce identity change"
            );
        }

        self.last_seen = Some(current);
        true
    }

    /// Check on a fixed interval until shutdown. The first check happens
    /// one interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(interval_secs = self.interval.as_secs(), "Watching outbound identity");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once().await;
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Identity watcher stopped");
        Ok(())
    }
}
