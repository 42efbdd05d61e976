//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Set Request ID  │ ← Generates X-Request-Id if absent
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Propagate Req ID │ ← Copies X-Request-Id onto the response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  IP Whitelist    │ ← 403 if the client IP is not whitelisted
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Admin API Key   │ ← 401/429 on bad keys (/admin only)
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/ready` - Health & monitoring
//! - `/api/token`, `/api/token/refresh`, `/api/whoami` - Token endpoints
//! - `/admin/whitelist`, `/admin/users`, `/admin/settings` - Admin API,
//!   mounted only when `ADMIN_API_KEY` is set

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{AdminApiKeyAuth, IpWhitelistLayer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// the gate can fall back to the peer address.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/token", post(handlers::obtain_token_pair))
        .route("/api/token/refresh", post(handlers::refresh_token))
        .route("/api/whoami", get(handlers::whoami));

    match &config.admin_api_key {
        Some(key) => {
            info!("Admin API enabled behind X-API-Key");
            let admin = admin_router().route_layer(AdminApiKeyAuth::new(key.clone()));
            router = router.nest("/admin", admin);
        }
        None => {
            warn!("ADMIN_API_KEY not set, admin API is not mounted");
        }
    }

    // Applied bottom to top: the last layer added sees the request first
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    router = router.layer(cors);

    info!(
        bypass_paths = ?config.gate_bypass_paths,
        "IP whitelist gate enabled"
    );
    router = router.layer(IpWhitelistLayer::new(
        state.store.clone(),
        state.settings.clone(),
        config.gate_bypass_paths.clone(),
    ));

    router = router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    router.with_state(state)
}

fn admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/whitelist",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route(
            "/whitelist/{id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/settings/reload", post(handlers::reload_settings))
        .route("/settings/{name}", get(handlers::get_setting))
}

/// Build CORS layer from configuration.
///
/// `["*"]` allows any origin; otherwise only the listed origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::settings::{SettingsSource, SharedSettings, WhitelistSettings};
    use crate::store::{SqliteStore, Store};

    async fn router(config: Config) -> Router {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let settings = SharedSettings::new(SettingsSource::Defaults, WhitelistSettings::default());
        build_router(AppState::new(store, settings, config))
    }

    fn request(method: &str, uri: &str, peer: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn test_build_cors_layer_any() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_gate_covers_every_route() {
        let app = router(Config::default()).await;

        for uri in ["/health", "/api/whoami", "/admin/whitelist", "/nope"] {
            let response = app
                .clone()
                .oneshot(request("GET", uri, "9.9.9.9:4000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_request_id_is_returned() {
        let app = router(Config::default()).await;
        let response = app
            .oneshot(request("GET", "/health", "127.0.0.1:4000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_admin_requires_key_when_configured() {
        let app = router(Config {
            admin_api_key: Some("admin-secret".to_string()),
            ..Config::default()
        })
        .await;

        let response = app
            .clone()
            .oneshot(request("GET", "/admin/whitelist", "127.0.0.1:4000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut req = request("GET", "/admin/whitelist", "127.0.0.1:4000");
        req.headers_mut()
            .insert("x-api-key", "admin-secret".parse().unwrap());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_is_not_mounted_without_key() {
        let app = router(Config::default()).await;

        for (method, uri) in [
            ("GET", "/admin/whitelist"),
            ("POST", "/admin/whitelist"),
            ("POST", "/admin/users"),
            ("POST", "/admin/settings/reload"),
        ] {
            let mut req = request(method, uri, "127.0.0.1:4000");
            req.headers_mut()
                .insert("x-forwarded-for", "127.0.0.1".parse().unwrap());
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_setting_is_404() {
        let app = router(Config {
            admin_api_key: Some("admin-secret".to_string()),
            ..Config::default()
        })
        .await;
        let mut req = request("GET", "/admin/settings/NOT_A_SETTING", "127.0.0.1:4000");
        req.headers_mut()
            .insert("x-api-key", "admin-secret".parse().unwrap());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "not_found");
    }
}
