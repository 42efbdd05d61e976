use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /api/token`.
///
/// Both fields are optional: a request without credentials goes straight to
/// IP-based authentication.
#[derive(Debug, Default, Deserialize)]
pub struct TokenObtainRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Access/refresh token pair.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub refresh: String,
    pub access: String,
}

/// Request body for `POST /api/token/refresh`.
#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

/// Response body for `POST /api/token/refresh`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub access: String,
}

/// Identity of the caller of `GET /api/whoami`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub user_id: i64,
    pub username: String,
    pub client_ip: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// A single resolved settings option.
#[derive(Debug, Serialize)]
pub struct SettingResponse {
    pub name: String,
    pub value: serde_json::Value,
}

/// Result of a settings reload.
#[derive(Debug, Serialize)]
pub struct SettingsReloadResponse {
    pub reloaded: bool,
    pub allowed_whitelisted_hosts: Vec<String>,
}
