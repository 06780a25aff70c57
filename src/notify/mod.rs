//! Outbound delivery of password-reset links.
//!
//! Delivery is best effort: callers spawn the send and only log its outcome, so a
//! failing relay never changes the response of the request that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::NotifyConfig;
use crate::errors::{Error, Result};

/// Password-reset message handed to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordResetNotice {
    pub address: String,
    pub username: String,
    pub reset_link: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, notice: &PasswordResetNotice) -> Result<()>;
}

/// Writes the notice to the log. Used when no relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, notice: &PasswordResetNotice) -> Result<()> {
        info!(
            address = %notice.address,
            username = %notice.username,
            "password reset requested; no mail relay configured"
        );
        Ok(())
    }
}

/// Posts the notice as JSON to a mail relay.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, notice), fields(username = %notice.username), name = "notify_password_reset")]
    async fn send_password_reset(&self, notice: &PasswordResetNotice) -> Result<()> {
        let body = serde_json::json!({
            "event": "password_reset",
            "to": notice.address,
            "username": notice.username,
            "reset_link": notice.reset_link,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::internal(format!("Mail relay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::internal(format!("Mail relay responded with {}", status)));
        }

        info!(status_code = status.as_u16(), "password reset notice delivered");
        Ok(())
    }
}

/// Pick the notifier for the configured delivery channel.
pub fn from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.webhook_timeout())),
        None => Arc::new(LogNotifier),
    }
}
