use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ExpenseCreated, NotificationSink, NotifyError};

/// Writes notifications to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &ExpenseCreated) -> Result<(), NotifyError> {
        tracing::info!(
            "New expense {} for {}: {} ({})",
            event.expense.id,
            event.owner.email.as_deref().unwrap_or("unknown"),
            event.expense.description,
            event.expense.amount
        );
        Ok(())
    }
}

/// POSTs notifications to an HTTP endpoint
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &ExpenseCreated) -> Result<(), NotifyError> {
        let body = json!({
            "event": "expense.created",
            "expense": event.expense,
            "user": event.owner,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "{} responded with {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}
