use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::TokenError;
use crate::store::StoreError;

/// Error code returned when neither password nor IP authentication produced
/// an active account.
pub const NO_ACTIVE_ACCOUNT: &str = "no_active_account";

/// Message paired with [`NO_ACTIVE_ACCOUNT`].
pub const NO_ACTIVE_ACCOUNT_MESSAGE: &str = "No active account found with the given credentials";

/// Application-wide error types with appropriate HTTP status codes.
///
/// "Not found" outcomes of IP resolution are not errors; they surface as
/// `Option::None` from the backend and only become [`AppError::AuthenticationFailed`]
/// once the token issuer has exhausted every authentication method.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { code: &'static str, message: String },

    #[error("Too many failed login attempts, retry after {0}s")]
    TooManyAttempts(u64),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// The fixed failure raised when password and IP authentication both fail.
    pub fn no_active_account() -> Self {
        AppError::AuthenticationFailed {
            code: NO_ACTIVE_ACCOUNT,
            message: NO_ACTIVE_ACCOUNT_MESSAGE.to_string(),
        }
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::Store(StoreError::Conflict(msg)) | AppError::Conflict(msg) => {
                tracing::warn!(error = %self, "Request conflicted with existing data");
                (StatusCode::CONFLICT, "conflict", msg.clone())
            }
            AppError::Store(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_error",
                    "Storage operation failed. Please contact support if the issue persists."
                        .to_string(),
                )
            }
            AppError::Token(TokenError::Signing(_)) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "token_error",
                    "Failed to issue token.".to_string(),
                )
            }
            AppError::Token(e) => {
                tracing::debug!(error = %e, "Rejected token");
                (
                    StatusCode::UNAUTHORIZED,
                    "token_not_valid",
                    "Given token not valid for any token type".to_string(),
                )
            }
            AppError::AuthenticationFailed { code, message } => {
                (StatusCode::UNAUTHORIZED, *code, message.clone())
            }
            AppError::TooManyAttempts(retry_after) => {
                let body = ErrorResponse {
                    error: "too_many_requests".to_string(),
                    message: "Too many failed authentication attempts. Please wait before retrying."
                        .to_string(),
                };
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("Retry-After", retry_after.to_string())],
                    axum::Json(body),
                )
                    .into_response();
            }
            AppError::PasswordHash(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred. Please contact support if the issue persists."
                        .to_string(),
                )
            }
            AppError::ConfigError(msg) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone())
            }
            AppError::SerializationError(_) => (
                StatusCode::BAD_REQUEST,
                "serialization_error",
                "Malformed JSON in request body".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
