//! # IP Whitelist Auth
//!
//! An axum service that authenticates requests by source IP address, in
//! addition to ordinary credentials:
//!
//! - **Request gate**: rejects every request whose client IP is not whitelisted
//! - **IP authentication**: resolves a user from the active whitelist entry
//!   for the client IP, provisioning the user on first use
//! - **Token endpoint**: issues access/refresh tokens, falling back to IP
//!   authentication when password authentication fails
//! - **Reloadable settings**: the `AUTH_IP_WHITELIST` block can be reloaded
//!   on SIGHUP or through the admin API
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → IP Gate → Admin Key)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, token, whitelist, users, settings)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Auth (TokenIssuer → PasswordBackend / IpAuthBackend)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store (SQLite: auth_ip_whitelist, users)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use ip_whitelist_auth::store::{SqliteStore, Store};
//! use ip_whitelist_auth::{AppState, Config, SharedSettings, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database_path).await?);
//!     let settings = SharedSettings::load(config.settings_source.clone()).await?;
//!
//!     let state = AppState::new(store, settings, config);
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Whitelist Configuration
//!
//! ```bash
//! AUTH_IP_WHITELIST='{"ALLOWED_WHITELISTED_HOSTS": ["127.0.0.1", "10.0.0.5"]}' cargo run
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod settings;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use settings::{SharedSettings, WhitelistSettings};
pub use state::AppState;
