//! ==============================================================================
//! notifier.rs - outbound delivery of approved alerts
//! ==============================================================================
//!
//! purpose:
//!     the alert gate only decides whether and what to send. this module is the
//!     hand-off point to whatever actually delivers the message.
//!
//! transports:
//!     - LogNotifier: writes the composed alert to the log. used when nothing
//!       else is configured so alerts are still visible.
//!     - WebhookNotifier: POSTs the alert as json to a delivery service
//!       (mail relay, chat bot, ...).
//!
//! relationships:
//!     - called by: pipeline.rs, always AFTER the state lock is released
//!     - configured by: config.rs ([notifier] section)
//!
//! ==============================================================================

use crate::alerts::Notification;
use crate::config::{NotifierConfig, NotifierKind};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Errors are logged by the caller and not retried.
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            device_id = notification.device_id,
            recipients = ?notification.recipients,
            "[ALERT] {}\n{}",
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("webhook POST to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("webhook returned {}", status));
        }
        info!("[ALERT] Delivered to {} recipient(s) via webhook", notification.recipients.len());
        Ok(())
    }
}

pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| anyhow!("notifier.webhook_url is not set"))?;
            let notifier = WebhookNotifier::new(url, Duration::from_secs(config.timeout_seconds))?;
            Ok(Arc::new(notifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            device_id: 33,
            subject: "📬 Mailbox Alert: 📬 Heavy Mail".to_string(),
            body: "body".to_string(),
            recipients: vec!["a@example.com".to_string()],
        }
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.deliver(&notification()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_an_error() {
        // bind then release so nothing is listening on the port
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/alerts", port);
        let notifier = WebhookNotifier::new(&url, Duration::from_secs(2)).unwrap();
        assert!(notifier.deliver(&notification()).await.is_err());
    }

    #[test]
    fn test_from_config() {
        assert!(from_config(&NotifierConfig::default()).is_ok());

        let missing_url = NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: None,
            timeout_seconds: 5,
        };
        assert!(from_config(&missing_url).is_err());

        let webhook = NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: Some("https://hooks.example.com".to_string()),
            timeout_seconds: 5,
        };
        assert!(from_config(&webhook).is_ok());
    }
}
