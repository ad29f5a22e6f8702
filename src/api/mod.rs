//! HTTP layer: route handlers and router composition.
//!
//! | Route     | Purpose                           |
//! |-----------|-----------------------------------|
//! | `GET /`   | browser front end                 |
//! | `GET /ws` | WebSocket upgrade                 |
//! | `/health` | liveness and current member count |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", handlers::web::index_service(&state))
        .route("/ws", get(ws_handler))
        .merge(handlers::system::routes())
        .fallback(handlers::web::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::path::PathBuf;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{BroadcasterConfig, LogFormat};
    use crate::hub::Hub;

    fn test_state() -> AppState {
        let config = BroadcasterConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            allowed_hosts: vec!["localhost".to_string()],
            index_path: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html")),
            log_format: LogFormat::Text,
        };
        AppState::new(Hub::spawn(), &config)
    }

    async fn call(method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let router = build_router(test_state());
        let Ok(request) = Request::builder().method(method).uri(uri).body(Body::empty()) else {
            panic!("request must build");
        };
        let Ok(response) = router.oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body must be readable");
        };
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_zero_connections() {
        let (status, body) = call(Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_path_is_json_404() {
        let (status, body) = call(Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2001);
        assert_eq!(body["error"]["message"], "not found: /nope");
    }

    #[tokio::test]
    async fn index_is_served() {
        let router = build_router(test_state());
        let Ok(request) = Request::builder().uri("/").body(Body::empty()) else {
            panic!("request must build");
        };
        let Ok(response) = router.oneshot(request).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_rejects_post() {
        let (status, _) = call(Method::POST, "/").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
