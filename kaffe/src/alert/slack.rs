//! Slack `chat.postMessage` notifier.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Notifier, http_client};
use crate::error::NotifyError;

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts messages to a Slack channel as a bot user.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    token: String,
    channel: String,
    api_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    /// Create a notifier whose requests are abandoned after `timeout`.
    pub fn new(
        token: impl Into<String>,
        channel: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            token: token.into(),
            channel: channel.into(),
            api_url: SLACK_POST_MESSAGE_URL.to_string(),
            client: http_client(timeout)?,
        })
    }

    /// Point the notifier at a different API endpoint.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Notifier for SlackNotifier {
    fn service(&self) -> &str {
        "slack"
    }

    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&PostMessage {
                channel: &self.channel,
                text: message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::rejected("slack", status.to_string()));
        }

        // Slack answers 200 with `ok: false` for most API errors.
        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::rejected(
                "slack",
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        debug!(channel = %self.channel, "Slack message posted");
        Ok(())
    }
}
