use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use url::Url;

use crate::config::AppConfig;
use crate::database::{DatabaseManager, ExpenseStore};
use crate::notify::{LogSink, NotificationSink, Notifier, WebhookSink};
use crate::services::ExpenseService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ExpenseStore>,
    pub expenses: Arc<ExpenseService>,
    /// Absolute URL of the expense collection, used for pagination links
    pub expenses_url: Url,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn ExpenseStore>, notifier: Notifier) -> anyhow::Result<Self> {
        let expenses_url = Url::parse(&format!("{}/expenses", config.api.public_url.trim_end_matches('/')))?;
        let expenses = Arc::new(ExpenseService::new(store.clone(), notifier));

        Ok(Self {
            config: Arc::new(config),
            store,
            expenses,
            expenses_url,
        })
    }

    /// Open the configured store and start the notification worker
    pub async fn from_config(config: AppConfig) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let store = DatabaseManager::open(&config.database).await?;

        let delivery_timeout = Duration::from_secs(config.notify.timeout_secs);
        let sink: Arc<dyn NotificationSink> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone(), delivery_timeout)?),
            None => Arc::new(LogSink),
        };
        let (notifier, worker) = Notifier::spawn(sink, config.notify.queue_capacity, delivery_timeout);

        Ok((Self::new(config, store, notifier)?, worker))
    }
}
