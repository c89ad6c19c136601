//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{KaffeConfig, SlackConfig, WebhookConfig, default_slack_channel};

/// Hubot endpoint used when only a token is given on the command line.
pub const DEFAULT_HUBOT_URL: &str = "https://hubot.abakus.no/moccamaster";

/// KAFFE command-line arguments. Flags override the configuration file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "kaffe", about = "Coffee machine hardware observers", version)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "kaffe.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the metrics listen address.
    #[arg(long)]
    pub listen: Option<String>,

    /// Hubot webhook URL for observer alerts.
    #[arg(long)]
    pub hubot: Option<String>,

    /// Hubot token.
    #[arg(long)]
    pub hubot_token: Option<String>,

    /// Slack bot token; enables the outbound IP watcher.
    #[arg(long)]
    pub slack_token: Option<String>,

    /// Slack channel for outbound IP announcements.
    #[arg(long)]
    pub slack_channel: Option<String>,
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration.
    ///
    /// Call [`KaffeConfig::validate`] afterwards.
    pub fn apply(&self, config: &mut KaffeConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        if let Some(listen) = &self.listen {
            config.metrics.listen = listen.clone();
        }

        if self.hubot.is_some() || self.hubot_token.is_some() {
            let existing = config.alerts.webhook.take();
            let url = self
                .hubot
                .clone()
                .or_else(|| existing.as_ref().map(|w| w.url.clone()))
                .unwrap_or_else(|| DEFAULT_HUBOT_URL.to_string());
            let token = self
                .hubot_token
                .clone()
                .or_else(|| existing.map(|w| w.token))
                .unwrap_or_default();
            config.alerts.webhook = Some(WebhookConfig { url, token });
        }

        if self.slack_token.is_some() || self.slack_channel.is_some() {
            let existing = config.alerts.slack.take();
            let token = self
                .slack_token
                .clone()
                .or_else(|| existing.as_ref().map(|s| s.token.clone()))
                .unwrap_or_default();
            let channel = self
                .slack_channel
                .clone()
                .or_else(|| existing.map(|s| s.channel))
                .unwrap_or_else(default_slack_channel);
            config.alerts.slack = Some(SlackConfig { token, channel });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> KaffeConfig {
        KaffeConfig::parse(r#"{ observers: [ { kind: "power", channel: 0 } ] }"#).unwrap()
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "kaffe",
            "--config",
            "/etc/kaffe.json5",
            "--hubot-token",
            "secret",
            "--slack-channel",
            "#kaffe",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/kaffe.json5"));
        assert_eq!(args.hubot_token.as_deref(), Some("secret"));
        assert_eq!(args.slack_channel.as_deref(), Some("#kaffe"));
        assert!(args.hubot.is_none());
    }

    #[test]
    fn test_default_config_path() {
        let args = Args::try_parse_from(["kaffe"]).unwrap();
        assert_eq!(args.config, PathBuf::from("kaffe.json5"));
    }

    #[test]
    fn test_hubot_token_uses_default_url() {
        let mut config = base_config();
        let args = Args {
            hubot_token: Some("secret".to_string()),
            ..Default::default()
        };

        args.apply(&mut config);

        let webhook = config.alerts.webhook.unwrap();
        assert_eq!(webhook.url, DEFAULT_HUBOT_URL);
        assert_eq!(webhook.token, "secret");
    }

    #[test]
    fn test_overrides_keep_file_values() {
        let mut config = KaffeConfig::parse(
            r##"{
                observers: [ { kind: "power", channel: 0 } ],
                alerts: { slack: { token: "xoxb-file", channel: "#kaffe" } }
            }"##,
        )
        .unwrap();
        let args = Args {
            slack_token: Some("xoxb-cli".to_string()),
            listen: Some("127.0.0.1:9000".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        args.apply(&mut config);

        let slack = config.ip_watcher().unwrap();
        assert_eq!(slack.token, "xoxb-cli");
        assert_eq!(slack.channel, "#kaffe");
        assert_eq!(config.metrics.listen, "127.0.0.1:9000");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_hubot_token_fails_validation() {
        let mut config = base_config();
        let args = Args {
            hubot: Some("https://hubot.example.org".to_string()),
            ..Default::default()
        };

        args.apply(&mut config);

        assert!(config.validate().is_err());
    }
}
