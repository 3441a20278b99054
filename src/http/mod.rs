//! HTTP surface: session/API-key auth, machine and alert management, the
//! agent ingestion path, and notification-channel CRUD (`spec.md` Sec. 6
//! "External interfaces").

mod agent;
mod alerts;
mod auth;
mod extract;
mod machines;
mod notifications;
mod prometheus;
mod readings;
mod state;

pub use state::AppState;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Format a Unix timestamp as RFC 3339 (`spec.md` Sec. 6 "Wire formats":
/// "Timestamps are ISO-8601 with timezone"). Mirrors
/// `notifications::types::timestamp_from_unix`.
pub(crate) fn iso8601(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Assemble the full router. CORS is scoped to a single allowed origin with
/// credentials, matching `spec.md` Sec. 6 `CORS_ALLOWED_ORIGIN` (a single
/// origin, not a wildcard, since cookies require it).
pub fn build_router(state: AppState) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true);
    if let Some(origin) = state.cors_allowed_origin.as_deref().and_then(|o| HeaderValue::from_str(o).ok()) {
        cors = cors.allow_origin(origin);
    }

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(auth::consume_reset))
        .route("/agent/register", post(agent::register))
        .route("/agent/metrics", post(agent::ingest_metrics))
        .route("/machines", get(machines::list))
        .route(
            "/machines/:id",
            get(machines::get).put(machines::update).delete(machines::delete),
        )
        .route("/machines/:id/enable", post(machines::enable))
        .route("/machines/:id/disable", post(machines::disable))
        .route("/machines/:id/rotate-key", post(machines::rotate_key))
        .route("/metrics", get(readings::latest))
        .route("/ws", get(readings::stream))
        .route("/system/info", get(readings::system_info))
        .route(
            "/alerts/rules",
            get(alerts::list_rules).post(alerts::create_rule),
        )
        .route(
            "/alerts/rules/:id",
            put(alerts::update_rule).delete(alerts::delete_rule),
        )
        .route("/alerts/events", get(alerts::list_events))
        .route("/alerts/events/:id/ack", post(alerts::acknowledge_event))
        .route(
            "/notifications/webhooks",
            get(notifications::list_webhooks).post(notifications::create_webhook),
        )
        .route("/notifications/webhooks/:id", axum::routing::delete(notifications::delete_webhook))
        .route("/notifications/webhooks/:id/enable", post(notifications::enable_webhook))
        .route("/notifications/webhooks/:id/disable", post(notifications::disable_webhook))
        .route("/notifications/webhooks/:id/test", post(notifications::test_webhook))
        .route(
            "/notifications/telegram",
            get(notifications::list_chat_recipients).post(notifications::create_chat_recipient),
        )
        .route(
            "/notifications/telegram/:id",
            axum::routing::delete(notifications::delete_chat_recipient),
        )
        .route("/notifications/telegram/:id/enable", post(notifications::enable_chat_recipient))
        .route("/notifications/telegram/:id/disable", post(notifications::disable_chat_recipient))
        .route("/notifications/telegram/:id/test", post(notifications::test_chat_recipient))
        .route("/internal/metrics", get(prometheus::handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertEvaluator;
    use crate::auth::AuthService;
    use crate::db::Database;
    use crate::ingestion::IngestionService;
    use crate::machines::MachineService;
    use crate::notifications::CompositeNotifier;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let db = Database::connect(":memory:").await.unwrap();
        let auth = AuthService::new(db.clone(), Duration::from_secs(3600), Duration::from_secs(900));
        let machines = MachineService::new(db.clone(), 120);
        let evaluator = Arc::new(AlertEvaluator::new(db.clone()));
        let notifier = Arc::new(CompositeNotifier::new(db.clone(), None));
        let ingestion = Arc::new(IngestionService::new(machines.clone(), Arc::clone(&evaluator), Arc::clone(&notifier)));

        build_router(AppState {
            db,
            auth,
            machines,
            ingestion,
            notifier,
            secure_cookie: false,
            cors_allowed_origin: None,
            local_host_metrics: false,
        })
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn session_cookie(login_response: &axum::response::Response) -> String {
        login_response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn register_then_login_then_me() {
        let app = test_router().await;

        let register = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({"email": "admin@example.com", "password": "hunter22hunter22"}),
            ))
            .await
            .unwrap();
        assert_eq!(register.status(), StatusCode::CREATED);

        let login = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({"email": "admin@example.com", "password": "hunter22hunter22"}),
            ))
            .await
            .unwrap();
        assert_eq!(login.status(), StatusCode::OK);
        let cookie = session_cookie(&login);

        let me = app
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn machines_route_rejects_anonymous_requests() {
        let app = test_router().await;

        let resp = app
            .oneshot(Request::builder().uri("/machines").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn agent_register_then_list_machines() {
        let app = test_router().await;

        app.clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({"email": "owner@example.com", "password": "hunter22hunter22"}),
            ))
            .await
            .unwrap();
        let login = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({"email": "owner@example.com", "password": "hunter22hunter22"}),
            ))
            .await
            .unwrap();
        let cookie = session_cookie(&login);

        let register_machine = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/agent/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, cookie.clone())
                    .body(Body::from(serde_json::json!({"name": "web-01"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(register_machine.status(), StatusCode::CREATED);

        let list = app
            .oneshot(
                Request::builder()
                    .uri("/machines")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(list.status(), StatusCode::OK);
    }
}
