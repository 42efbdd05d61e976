//! API key guard for the admin API.
//!
//! Applied to the `/admin` router only. The key is read from the `X-API-Key`
//! header and compared in constant time. The admin API is only mounted when
//! a key is configured.
//!
//! ```bash
//! curl -H "X-API-Key: your-secret-key" http://localhost:8000/admin/whitelist
//! ```
//!
//! # Brute Force Protection
//!
//! Missing or wrong keys count as failures against a per-IP
//! [`LoginThrottle`]. Once an address runs out of failures it is turned away
//! with 429 before its key is even looked at.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::extract_client_ip;
use crate::auth::LoginThrottle;
use crate::error::AppError;

/// Header name for the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Failed key attempts allowed per IP per minute.
pub const DEFAULT_ADMIN_KEY_FAILURE_LIMIT: u32 = 5;

/// Admin API key layer.
#[derive(Clone)]
pub struct AdminApiKeyAuth {
    expected_key: Arc<String>,
    failures: LoginThrottle,
}

impl AdminApiKeyAuth {
    pub fn new(api_key: String) -> Self {
        Self::with_failure_limit(api_key, DEFAULT_ADMIN_KEY_FAILURE_LIMIT)
    }

    /// Allow `failures_per_minute` bad keys per IP; 0 disables the limit.
    pub fn with_failure_limit(api_key: String, failures_per_minute: u32) -> Self {
        Self {
            expected_key: Arc::new(api_key),
            failures: LoginThrottle::new(failures_per_minute),
        }
    }
}

impl<S> Layer<S> for AdminApiKeyAuth {
    type Service = AdminApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminApiKeyAuthService {
            inner,
            expected_key: self.expected_key.clone(),
            failures: self.failures.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdminApiKeyAuthService<S> {
    inner: S,
    expected_key: Arc<String>,
    failures: LoginThrottle,
}

impl<S> Service<Request<Body>> for AdminApiKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected = self.expected_key.clone();
        let failures = self.failures.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client_ip = extract_client_ip(&req).map(|ip| ip.0);
            let ip_key = client_ip.as_deref();

            if let Err(retry_after) = failures.check(ip_key) {
                return Ok(AppError::TooManyAttempts(retry_after).into_response());
            }

            match extract_api_key(&req).map(str::to_owned) {
                Some(provided) if constant_time_eq(&provided, &expected) => {
                    debug!("Admin API key accepted");
                    inner.call(req).await
                }
                provided => {
                    warn!(
                        path = %req.uri().path(),
                        client_ip = ip_key.unwrap_or_default(),
                        key_present = provided.is_some(),
                        "Rejected admin request"
                    );
                    if let Err(retry_after) = failures.record_failure(ip_key) {
                        return Ok(AppError::TooManyAttempts(retry_after).into_response());
                    }
                    let message = if provided.is_some() {
                        "Invalid API key"
                    } else {
                        "API key required"
                    };
                    Ok(unauthorized_response(message))
                }
            }
        })
    }
}

fn extract_api_key<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "API-Key")],
        axum::Json(serde_json::json!({ "error": "unauthorized", "message": message })),
    )
        .into_response()
}
