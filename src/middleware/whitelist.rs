//! IP whitelist gate.
//!
//! Rejects every request whose client IP is outside the allow-set with
//! `403 {"detail": "Access Forbidden: Your IP is not whitelisted."}` before
//! any handler runs. The allow-set is the union of the configured
//! `ALLOWED_WHITELISTED_HOSTS` and the IPs of *active* store entries; it is
//! evaluated live on every request.
//!
//! Requests that pass get a [`ClientIp`] extension so that handlers (the
//! token endpoint in particular) can authenticate by address.
//!
//! Store failures fail closed with a 500 response.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::{ClientIp, extract_client_ip};
use crate::error::AppError;
use crate::metrics;
use crate::settings::{SharedSettings, WhitelistSettings};
use crate::store::{Store, StoreError, WhitelistStore};

/// Body detail of the rejection response.
pub const FORBIDDEN_DETAIL: &str = "Access Forbidden: Your IP is not whitelisted.";

/// Whether `ip` is in the allow-set.
///
/// Configured hosts are checked first so that they never cost a store query.
pub async fn is_whitelisted(
    store: &dyn Store,
    settings: &WhitelistSettings,
    ip: &str,
) -> Result<bool, StoreError> {
    if settings.allows_host(ip) {
        return Ok(true);
    }
    store.is_active_ip(ip).await
}

/// Request gate layer.
#[derive(Clone)]
pub struct IpWhitelistLayer {
    store: Arc<dyn Store>,
    settings: SharedSettings,
    bypass_paths: Arc<Vec<String>>,
}

impl IpWhitelistLayer {
    /// # Arguments
    ///
    /// * `store` - Source of whitelist entries
    /// * `settings` - Reloadable settings holding the statically allowed hosts
    /// * `bypass_paths` - Paths that skip the gate (exact match)
    pub fn new(store: Arc<dyn Store>, settings: SharedSettings, bypass_paths: Vec<String>) -> Self {
        Self {
            store,
            settings,
            bypass_paths: Arc::new(bypass_paths),
        }
    }
}

impl<S> Layer<S> for IpWhitelistLayer {
    type Service = IpWhitelistService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpWhitelistService {
            inner,
            store: self.store.clone(),
            settings: self.settings.clone(),
            bypass_paths: self.bypass_paths.clone(),
        }
    }
}

/// Request gate service wrapper.
#[derive(Clone)]
pub struct IpWhitelistService<S> {
    inner: S,
    store: Arc<dyn Store>,
    settings: SharedSettings,
    bypass_paths: Arc<Vec<String>>,
}

impl<S> Service<Request<Body>> for IpWhitelistService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let store = self.store.clone();
        let settings = self.settings.clone();
        let bypass_paths = self.bypass_paths.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();
            if bypass_paths.iter().any(|p| *p == path) {
                debug!(path = %path, "Bypassing IP whitelist gate");
                metrics::record_gate_decision("bypassed");
                return inner.call(req).await;
            }

            let Some(client_ip) = extract_client_ip(&req) else {
                warn!(path = %path, "No client IP could be determined, rejecting");
                metrics::record_gate_decision("rejected");
                return Ok(forbidden_response());
            };

            let current = settings.current().await;
            match is_whitelisted(store.as_ref(), &current, client_ip.as_str()).await {
                Ok(true) => {
                    debug!(client_ip = %client_ip, "IP whitelisted");
                    metrics::record_gate_decision("allowed");
                    req.extensions_mut().insert::<ClientIp>(client_ip);
                    inner.call(req).await
                }
                Ok(false) => {
                    warn!(client_ip = %client_ip, path = %path, "Rejected non-whitelisted IP");
                    metrics::record_gate_decision("rejected");
                    Ok(forbidden_response())
                }
                Err(e) => {
                    metrics::record_gate_decision("error");
                    Ok(AppError::from(e).into_response())
                }
            }
        })
    }
}

/// Build the fixed 403 rejection.
fn forbidden_response() -> Response<Body> {
    (
        StatusCode::FORBIDDEN,
        axum::Json(serde_json::json!({ "detail": FORBIDDEN_DETAIL })),
    )
        .into_response()
}
