use std::future::Future;
use std::time::Duration;

use tracing::info;

use crate::db::Order;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("webhook request failed: {0}")]
    Request(reqwest::Error),
    #[error("webhook responded with HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound delivery of a composed notification to the order's owner.
pub trait Notifier: Send + Sync + 'static {
    fn notify(
        &self,
        order: &Order,
        text: &str,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, order: &Order, text: &str) -> Result<(), NotifyError> {
        info!(
            recipient = order.telegram_id,
            order_id = order.id,
            text,
            "order notification"
        );
        Ok(())
    }
}

/// POSTs `{"recipient": .., "order_id": .., "text": ..}` to a chat gateway.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, order: &Order, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "recipient": order.telegram_id,
            "order_id": order.id,
            "text": text,
        }))?;
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(NotifyError::Request)?;

        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        info!(recipient = order.telegram_id, order_id = order.id, "notification delivered");
        Ok(())
    }
}

/// Either of the built-in notifiers, chosen from configuration.
pub enum AnyNotifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl Notifier for AnyNotifier {
    async fn notify(&self, order: &Order, text: &str) -> Result<(), NotifyError> {
        match self {
            AnyNotifier::Log(n) => n.notify(order, text).await,
            AnyNotifier::Webhook(n) => n.notify(order, text).await,
        }
    }
}
