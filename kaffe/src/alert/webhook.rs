//! Hubot webhook notifier.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{Notifier, http_client};
use crate::error::NotifyError;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
}

/// Posts alerts as `{"message": ...}` to a webhook with a bearer token.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier whose requests are abandoned after `timeout`.
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            url: url.into(),
            token: token.into(),
            client: http_client(timeout)?,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn service(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&WebhookPayload { message })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.url, "Webhook alert sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::rejected(
                "webhook",
                format!("{}: {}", status, body),
            ))
        }
    }
}
