//! Token endpoints.
//!
//! - `POST /api/token` - obtain a refresh/access pair by password or client IP
//! - `POST /api/token/refresh` - exchange a refresh token for a new access token
//! - `GET /api/whoami` - identify the bearer of an access token

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{Extension, Json};
use tracing::instrument;

use crate::auth::{TokenType, user_can_authenticate};
use crate::error::{AppError, AppResult};
use crate::middleware::ClientIp;
use crate::models::{
    TokenObtainRequest, TokenPairResponse, TokenRefreshRequest, TokenRefreshResponse,
    WhoAmIResponse,
};
use crate::state::AppState;
use crate::store::UserStore;

const BEARER_PREFIX: &str = "Bearer ";

/// Obtain a token pair.
///
/// The body is optional: `{}` or an empty body authenticates by client IP
/// only. Credentials, when present, are tried first.
///
/// ```json
/// { "username": "alice", "password": "..." }
/// ```
#[instrument(skip_all, fields(client_ip = tracing::field::Empty))]
pub async fn obtain_token_pair(
    State(state): State<AppState>,
    client_ip: Option<Extension<ClientIp>>,
    body: Bytes,
) -> AppResult<Json<TokenPairResponse>> {
    let client_ip = client_ip.map(|Extension(ip)| ip);
    let ip_key = client_ip.as_ref().map(ClientIp::as_str);
    if let Some(ip) = ip_key {
        tracing::Span::current().record("client_ip", ip);
    }

    state
        .throttle
        .check(ip_key)
        .map_err(AppError::TooManyAttempts)?;

    let request: TokenObtainRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TokenObtainRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    match state.issuer.obtain_pair(&request, client_ip.as_ref()).await {
        Ok(issued) => Ok(Json(issued.tokens)),
        Err(e) => {
            if matches!(e, AppError::AuthenticationFailed { .. }) {
                state
                    .throttle
                    .record_failure(ip_key)
                    .map_err(AppError::TooManyAttempts)?;
            }
            Err(e)
        }
    }
}

/// Exchange a refresh token for a new access token.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRefreshRequest>,
) -> AppResult<Json<TokenRefreshResponse>> {
    let access = state.issuer.signer().refresh_access(&payload.refresh)?;
    Ok(Json(TokenRefreshResponse { access }))
}

/// Identify the caller from a `Bearer` access token.
#[instrument(skip_all)]
pub async fn whoami(
    State(state): State<AppState>,
    client_ip: Option<Extension<ClientIp>>,
    headers: HeaderMap,
) -> AppResult<Json<WhoAmIResponse>> {
    let token = bearer_token(&headers)?;
    let claims = state.issuer.signer().verify(token, TokenType::Access)?;

    let user = state
        .store
        .get_user(claims.user_id)
        .await?
        .filter(user_can_authenticate)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;

    Ok(Json(WhoAmIResponse {
        user_id: user.id,
        username: user.username,
        client_ip: client_ip.map(|Extension(ip)| ip.0),
    }))
}

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".to_string())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
