// Post-commit notifications for new expenses.
//
// The service emits an `ExpenseCreated` event onto a bounded channel after
// the create transaction commits. A single worker task drains the channel and
// hands each event to a `NotificationSink`. Delivery results are only logged.

pub mod sinks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::database::models::Expense;
use crate::middleware::Principal;

pub use sinks::{LogSink, WebhookSink};

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseCreated {
    pub expense: Expense,
    pub owner: Principal,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Destination for new-expense notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &ExpenseCreated) -> Result<(), NotifyError>;
}

/// Handle used by the service to emit events; cheap to clone
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<ExpenseCreated>,
}

impl Notifier {
    /// Start the delivery worker. The worker exits once every `Notifier`
    /// clone has been dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize, delivery_timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, sink, delivery_timeout));
        (Self { tx }, worker)
    }

    /// Queue a notification without waiting for delivery
    pub fn expense_created(&self, expense: &Expense, owner: &Principal) {
        let event = ExpenseCreated {
            expense: expense.clone(),
            owner: owner.clone(),
        };

        match self.tx.try_send(event) {
            Ok(()) => tracing::debug!("Queued notification for expense {}", expense.id),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Notification queue full; dropping notification for expense {}", expense.id)
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Notification worker stopped; dropping notification for expense {}", expense.id)
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<ExpenseCreated>, sink: Arc<dyn NotificationSink>, delivery_timeout: Duration) {
    tracing::info!("Notification worker started with sink '{}'", sink.name());

    while let Some(event) = rx.recv().await {
        let result = match timeout(delivery_timeout, sink.deliver(&event)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(delivery_timeout)),
        };

        match result {
            Ok(()) => tracing::debug!(
                "Sink '{}' delivered notification for expense {}",
                sink.name(),
                event.expense.id
            ),
            Err(e) => tracing::error!(
                "Sink '{}' failed to notify {} about expense {}: {}",
                sink.name(),
                event.owner.id,
                event.expense.id,
                e
            ),
        }
    }

    tracing::info!("Notification worker stopped");
}
