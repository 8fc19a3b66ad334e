use async_trait::async_trait;
use reqwest::Client;

use crate::core::error::SyncError;

/// Receives the rendered outcome of a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, lines: &[String]) -> Result<(), SyncError>;
}

/// Writes the report into the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, lines: &[String]) -> Result<(), SyncError> {
        tracing::info!("{}", subject);
        for line in lines {
            tracing::info!("  {}", line);
        }
        Ok(())
    }
}

/// Posts the report as `{"text": ...}` (Slack-compatible).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, lines: &[String]) -> Result<(), SyncError> {
        let text = format_webhook_text(subject, lines);
        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(SyncError::from)?
            .error_for_status()
            .map_err(SyncError::from)?;
        Ok(())
    }
}

fn format_webhook_text(subject: &str, lines: &[String]) -> String {
    let mut out = vec![subject.to_string()];
    out.extend(lines.iter().cloned());
    out.join("\n")
}

/// Fan a report out to several notifiers; one failing does not stop the rest.
pub async fn notify_all(notifiers: &[Box<dyn Notifier>], subject: &str, lines: &[String]) {
    for notifier in notifiers {
        if let Err(err) = notifier.notify(subject, lines).await {
            tracing::warn!("notification failed: {}", err);
        }
    }
}
