//! Process bootstrap: wires the ADC, observers, metrics server and alert
//! watcher into a [`Supervisor`] and runs it to completion.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kaffe_exporter::{HttpServer, MetricRegistry};
use tracing::{info, warn};

use crate::adc::{Adc, SharedAdc};
use crate::alert::{IdentityWatcher, OutboundIp, SlackNotifier};
use crate::config::KaffeConfig;
use crate::observer::build_sensors;
use crate::supervisor::{Supervisor, shutdown_signal};

/// Run until SIGINT/SIGTERM or the first runtime failure.
///
/// Returns an error for startup failures and for failure-initiated drains.
pub async fn run(config: KaffeConfig) -> anyhow::Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Same as [`run`] with an arbitrary termination future.
pub async fn run_until<F>(config: KaffeConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let listen_addr: SocketAddr = config
        .metrics
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let adc: SharedAdc = Arc::new(Adc::open(&config.adc).context("Failed to open the ADC")?);
    info!(channels = adc.channels(), "ADC ready");

    let sensors =
        build_sensors(&config, &adc).context("Failed to create the alert webhook client")?;

    let mut registry = MetricRegistry::new();
    let mut supervisor = Supervisor::new(
        sensors,
        &mut registry,
        Duration::from_secs(config.supervisor.poll_interval_secs),
    )
    .context("Failed to register observer metrics")?
    .with_drain_timeout(Duration::from_secs(config.supervisor.drain_timeout_secs));
    let registry = Arc::new(registry);

    let server = HttpServer::new(registry, listen_addr, config.metrics.path.clone());
    let server_shutdown = supervisor.shutdown_receiver();
    supervisor.spawn_service("metrics", server.run(server_shutdown));

    match config.ip_watcher() {
        Some(slack) => {
            let notifier =
                SlackNotifier::new(&slack.token, &slack.channel, config.alert_timeout())
                    .context("Failed to create the Slack client")?;
            let watcher = IdentityWatcher::new(
                OutboundIp::new(),
                notifier,
                Duration::from_secs(config.alerts.ip_watch_interval_secs),
            );
            let watcher_shutdown = supervisor.shutdown_receiver();
            supervisor.spawn_peripheral("ip-watcher", watcher.run(watcher_shutdown));
            info!(channel = %slack.channel, "Outbound IP announcements enabled");
        }
        None => info!("Slack not configured, outbound IP watcher disabled"),
    }

    match &config.alerts.webhook {
        Some(webhook) => info!(url = %webhook.url, "Observer alerts go to webhook"),
        None => info!("No alert webhook configured, observer alerts are only logged"),
    }

    let report = supervisor.run_until(shutdown).await;

    if let Err(e) = adc.close().await {
        warn!(error = %e, "Could not close the ADC");
    }

    report.into_result()
}
