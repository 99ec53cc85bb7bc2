use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, Environment};
use crate::handlers::{protected, public};
use crate::middleware::{jwt_auth_middleware, method_not_allowed_envelope};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Protected API
        .merge(expense_routes(state.clone()))
        .fallback(public::not_found)
        .layer(middleware::from_fn(method_not_allowed_envelope))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes));

    if let Some(cors) = cors_layer(&state.config) {
        router = router.layer(cors);
    }
    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn expense_routes(state: AppState) -> Router<AppState> {
    use protected::expenses;

    Router::new()
        .route("/expenses", get(expenses::index).post(expenses::store))
        .route(
            "/expenses/:id",
            get(expenses::show)
                .put(expenses::update)
                .delete(expenses::destroy),
        )
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }
    if config.environment == Environment::Development {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(CorsLayer::new().allow_origin(AllowOrigin::list(origins)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::database::ExpenseStore;
    use crate::testing::{token_for, FailingSink, TestApp};

    fn body() -> Value {
        json!({
            "description": "Test Expense",
            "date": "2023-05-11",
            "amount": 99.99
        })
    }

    #[tokio::test]
    async fn store_returns_created_envelope() {
        let app = TestApp::new();
        let user = Uuid::new_v4();

        let (status, json) = app.post(user, "/expenses", body()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["description"], "Test Expense");
        assert_eq!(json["data"]["date"], "2023-05-11T00:00:00Z");
        assert_eq!(json["data"]["user_id"], user.to_string());
        assert_eq!(json["data"]["amount"], 99.99);
        assert!(json["data"]["id"].is_i64());
        assert!(json["data"]["created_at"].is_string());
        assert!(json["data"]["updated_at"].is_string());
    }

    #[tokio::test]
    async fn store_reports_field_errors_without_persisting() {
        let app = TestApp::new();

        let (status, json) = app
            .post(Uuid::new_v4(), "/expenses", json!({ "description": "No date" }))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "error");
        assert_eq!(json["errors"]["date"][0], "Date is required");
        assert_eq!(json["errors"]["amount"][0], "amount is required");
        assert!(json["errors"].get("description").is_none());
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new();
        let (status, json) = app.send_raw(Uuid::new_v4(), "POST", "/expenses", "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn show_round_trips_the_created_fields() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let (_, created) = app.post(user, "/expenses", body()).await;
        let id = created["data"]["id"].as_i64().unwrap();

        let (status, json) = app.get(user, &format!("/expenses/{}", id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], created["data"]);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_record() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let (_, created) = app.post(owner, "/expenses", body()).await;
        let path = format!("/expenses/{}", created["data"]["id"]);

        let (status, json) = app.get(intruder, &path).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["status"], "error");

        let (status, _) = app.put(intruder, &path, body()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.delete(intruder, &path).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app.get(owner, &path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["description"], "Test Expense");
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_is_idempotent() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let (_, created) = app.post(user, "/expenses", body()).await;
        let path = format!("/expenses/{}", created["data"]["id"]);
        let change = json!({ "description": "Updated Expense", "date": "2023-06-01", "amount": "10.5" });

        let (status, first) = app.put(user, &path, change.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = app.put(user, &path, change).await;

        for field in ["id", "description", "date", "user_id", "amount", "created_at"] {
            assert_eq!(first["data"][field], second["data"][field], "field {}", field);
        }
        assert_eq!(second["data"]["description"], "Updated Expense");
        assert_eq!(second["data"]["date"], "2023-06-01T00:00:00Z");
        assert_eq!(second["data"]["amount"], 10.5);
        assert_eq!(second["data"]["user_id"], user.to_string());
    }

    #[tokio::test]
    async fn high_precision_amounts_come_back_unchanged() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let payload = json!({ "description": "Fleet purchase", "date": "2023-05-11", "amount": "12345678901234567.89" });

        let (status, created) = app.post(user, "/expenses", payload).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["amount"].to_string(), "12345678901234567.89");

        let path = format!("/expenses/{}", created["data"]["id"]);
        let (_, shown) = app.get(user, &path).await;
        assert_eq!(shown["data"]["amount"].to_string(), "12345678901234567.89");

        let (_, listed) = app.get(user, "/expenses").await;
        assert_eq!(listed["data"]["data"][0]["amount"].to_string(), "12345678901234567.89");
    }

    #[tokio::test]
    async fn update_validates_before_looking_up_the_record() {
        let app = TestApp::new();
        let (status, json) = app.put(Uuid::new_v4(), "/expenses/12345", json!({ "amount": "abc" })).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["errors"]["amount"][0], "The amount must be a number.");
    }

    #[tokio::test]
    async fn delete_then_delete_again_is_not_found() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let (_, created) = app.post(user, "/expenses", body()).await;
        let path = format!("/expenses/{}", created["data"]["id"]);

        let (status, json) = app.delete(user, &path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "status": "success", "data": "Expense deleted successfully." }));

        let (status, json) = app.get(user, &path).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Expense not found");

        let (status, _) = app.delete(user, &path).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_ids_are_not_found() {
        let app = TestApp::new();
        let (status, json) = app.get(Uuid::new_v4(), "/expenses/abc").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn index_only_lists_own_records_with_paging() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        for _ in 0..12 {
            app.post(user, "/expenses", body()).await;
        }
        for _ in 0..3 {
            app.post(other, "/expenses", body()).await;
        }

        let (status, json) = app.get(user, "/expenses").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");

        let page = &json["data"];
        assert_eq!(page["total"], 12);
        assert_eq!(page["per_page"], 10);
        assert_eq!(page["current_page"], 1);
        assert_eq!(page["last_page"], 2);
        assert_eq!(page["data"].as_array().unwrap().len(), 10);
        assert!(page["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e["user_id"] == user.to_string()));
        assert_eq!(page["path"], "http://localhost:3000/expenses");
        assert_eq!(page["next_page_url"], "http://localhost:3000/expenses?page=2");
        assert!(page["prev_page_url"].is_null());
        for key in ["first_page_url", "from", "last_page_url", "links", "to"] {
            assert!(page.get(key).is_some(), "missing {}", key);
        }

        let (_, json) = app.get(user, "/expenses?page=2").await;
        assert_eq!(json["data"]["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"]["from"], 11);
        assert_eq!(json["data"]["to"], 12);
    }

    #[tokio::test]
    async fn index_of_a_new_user_is_an_empty_page() {
        let app = TestApp::new();
        let (status, json) = app.get(Uuid::new_v4(), "/expenses").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 0);
        assert!(json["data"]["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn requests_without_valid_token_are_unauthorized() {
        let app = TestApp::new();

        let (status, json) = app.send_unauthenticated("GET", "/expenses", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["status"], "error");

        let (status, _) = app
            .send_with_token("not.a.jwt", "POST", "/expenses", Some(body()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn storage_fault_returns_generic_error_and_no_row() {
        let app = TestApp::new();
        let user = Uuid::new_v4();

        app.store.fail_next_commit();
        let (status, json) = app.post(user, "/expenses", body()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({
            "status": "error",
            "message": "Error creating expense",
            "code": "INTERNAL_SERVER_ERROR"
        }));
        assert!(app.store.is_empty().await);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_request() {
        let app = TestApp::with_sink(Arc::new(FailingSink));
        let (status, json) = app.post(Uuid::new_v4(), "/expenses", body()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "success");
        assert_eq!(app.store.len().await, 1);
    }

    #[tokio::test]
    async fn create_notifies_the_owner() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let (_, created) = app.post(user, "/expenses", body()).await;

        let events = app.sink.wait_for(1, std::time::Duration::from_secs(2)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner.id, user);
        assert_eq!(json!(events[0].expense.id), created["data"]["id"]);
    }

    #[tokio::test]
    async fn health_and_unknown_routes_use_the_envelope() {
        let app = TestApp::new();

        let (status, json) = app.send_unauthenticated("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert!(app.store.health_check().await.is_ok());

        let (status, json) = app.send_unauthenticated("GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn unsupported_methods_use_the_envelope() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let (_, created) = app.post(user, "/expenses", body()).await;
        let path = format!("/expenses/{}", created["data"]["id"]);

        let (status, json) = app.send_with_token(&token_for(user), "PATCH", &path, Some(body())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "METHOD_NOT_ALLOWED");
        assert!(json["message"].as_str().is_some_and(|m| m.contains("PATCH")));

        let (status, json) = app.send_unauthenticated("POST", "/health", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn unhealthy_storage_reports_unavailable() {
        let app = TestApp::new();
        app.store.fail_health_checks();

        let (status, json) = app.send_unauthenticated("GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
    }
}
