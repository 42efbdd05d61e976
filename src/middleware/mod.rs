//! HTTP middleware.
//!
//! - **IP whitelist gate**: rejects requests from addresses outside the allow-set
//! - **Admin API key**: constant-time `X-API-Key` check on `/admin`
//! - **Client IP extraction**: `X-Forwarded-For` first, then the TCP peer
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Trace → IP Gate → CORS → [Admin Key] → Handler
//!                                   ↓                  ↓
//!                              403 Forbidden      401 Unauth
//! ```
//!
//! Request IDs and tracing come from `tower-http`.

pub mod auth;
pub mod ip;
pub mod whitelist;

pub use auth::AdminApiKeyAuth;
pub use ip::{ClientIp, FORWARDED_FOR_HEADER, extract_client_ip};
pub use whitelist::{FORBIDDEN_DETAIL, IpWhitelistLayer, is_whitelisted};
