use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::config::{AppConfig, StorageBackend};
use crate::database::models::{Expense, ExpenseInput};
use crate::database::MemoryExpenseStore;
use crate::notify::{ExpenseCreated, NotificationSink, Notifier, NotifyError};
use crate::routes::app;
use crate::state::AppState;

pub const TEST_SECRET: &str = "test-secret";

/// Sink that keeps every delivered event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExpenseCreated>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ExpenseCreated> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Poll until `count` events arrived or `limit` elapsed
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<ExpenseCreated> {
        let deadline = Instant::now() + limit;
        loop {
            let events = self.events();
            if events.len() >= count || Instant::now() > deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, event: &ExpenseCreated) -> Result<(), NotifyError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

/// Sink that always fails
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _event: &ExpenseCreated) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("mail server unreachable".to_string()))
    }
}

pub fn expense_input(description: &str) -> ExpenseInput {
    ExpenseInput {
        description: description.to_string(),
        date: Utc.with_ymd_and_hms(2023, 5, 11, 0, 0, 0).unwrap(),
        amount: Decimal::new(9999, 2),
    }
}

pub fn sample_expense(id: i64, owner_id: Uuid) -> Expense {
    let now = Utc::now();
    Expense {
        id,
        description: format!("Expense {}", id),
        date: now,
        owner_id,
        amount: Decimal::new(100, 2),
        created_at: now,
        updated_at: now,
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.database.backend = StorageBackend::Memory;
    config.security.jwt_secret = TEST_SECRET.to_string();
    config.api.enable_request_logging = false;
    config
}

pub fn token_for(user: Uuid) -> String {
    let claims = Claims::new(user, Some(format!("{}@example.com", user.simple())), None, 1);
    generate_jwt(&claims, TEST_SECRET).unwrap()
}

/// Router over a memory store, driven with `oneshot`
pub struct TestApp {
    pub router: Router,
    pub store: MemoryExpenseStore,
    pub sink: Arc<RecordingSink>,
}

impl TestApp {
    pub fn new() -> Self {
        let sink = Arc::new(RecordingSink::default());
        Self::build(sink.clone(), sink)
    }

    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self::build(sink, Arc::new(RecordingSink::default()))
    }

    fn build(sink: Arc<dyn NotificationSink>, recording: Arc<RecordingSink>) -> Self {
        let store = MemoryExpenseStore::new();
        let (notifier, _worker) = Notifier::spawn(sink, 64, Duration::from_secs(1));
        let state = AppState::new(test_config(), Arc::new(store.clone()), notifier).unwrap();

        Self {
            router: app(state),
            store,
            sink: recording,
        }
    }

    pub async fn get(&self, user: Uuid, path: &str) -> (StatusCode, Value) {
        self.send_with_token(&token_for(user), "GET", path, None).await
    }

    pub async fn post(&self, user: Uuid, path: &str, body: Value) -> (StatusCode, Value) {
        self.send_with_token(&token_for(user), "POST", path, Some(body)).await
    }

    pub async fn put(&self, user: Uuid, path: &str, body: Value) -> (StatusCode, Value) {
        self.send_with_token(&token_for(user), "PUT", path, Some(body)).await
    }

    pub async fn delete(&self, user: Uuid, path: &str) -> (StatusCode, Value) {
        self.send_with_token(&token_for(user), "DELETE", path, None).await
    }

    pub async fn send_with_token(&self, token: &str, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        self.dispatch(request, body.map(|b| b.to_string())).await
    }

    pub async fn send_unauthenticated(&self, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(path);
        self.dispatch(request, body.map(|b| b.to_string())).await
    }

    /// Send a body verbatim, e.g. malformed JSON
    pub async fn send_raw(&self, user: Uuid, method: &str, path: &str, raw: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
        self.dispatch(request, Some(raw.to_string())).await
    }

    async fn dispatch(&self, request: axum::http::request::Builder, body: Option<String>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body)),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
