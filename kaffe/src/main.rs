//! KAFFE daemon.
//!
//! Usage:
//! ```bash
//! kaffe --config kaffe.json5
//! kaffe --config kaffe.json5 --hubot-token <token> --slack-token <token>
//! ```

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kaffe::args::Args;
use kaffe::config::KaffeConfig;
use kaffe::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = KaffeConfig::read_from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        observers = config.observers.len(),
        "Starting KAFFE"
    );

    kaffe::app::run(config).await
}
