//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! The whitelist settings block (`AUTH_IP_WHITELIST`) is not part of this
//! struct: it is reloadable at runtime and lives in [`crate::settings`]. Only
//! its source is recorded here.
//!
//! # Security Configuration
//!
//! - `ADMIN_API_KEY`: Mounts the `/admin` API behind the `X-API-Key` header (unset = no admin API)
//! - `JWT_SIGNING_KEY`: HMAC key for access/refresh tokens (random per process if unset)
//! - `LOGIN_FAILURE_LIMIT`: Failed token requests per IP per minute (0 disables throttling)
//! - `GATE_BYPASS_PATHS`: Comma-separated paths that skip the IP gate (default: none)
//!
//! # Authentication Behaviour
//!
//! - `CREATE_UNKNOWN_USER`: Provision users for whitelisted usernames (default: true)
//! - `UPDATE_LAST_LOGIN`: Record last login when tokens are issued (default: false)
//! - `ACCESS_TOKEN_LIFETIME_SECS` / `REFRESH_TOKEN_LIFETIME_SECS`: 300 / 86400

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::settings::SettingsSource;

/// Minimum accepted length for a configured signing key.
pub const MIN_SIGNING_KEY_LENGTH: usize = 32;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 64KB)
    pub max_request_body_size: usize,

    /// Comma-separated list of allowed CORS origins
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Storage
    // =========================================================================
    /// SQLite database path, or `:memory:` (default: "ip_whitelist.db")
    pub database_path: String,

    // =========================================================================
    // Whitelist Gate
    // =========================================================================
    /// Where the reloadable `AUTH_IP_WHITELIST` block is read from
    pub settings_source: SettingsSource,

    /// Paths that skip the IP gate entirely (exact match).
    /// Default: empty, every request is checked.
    pub gate_bypass_paths: Vec<String>,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Provision a user for a whitelisted username that has no account yet.
    /// When false, only existing users are resolved.
    pub create_unknown_user: bool,

    /// HMAC signing key for tokens. `None` = generate a random key at startup.
    pub signing_key: Option<String>,

    pub access_token_lifetime: Duration,

    pub refresh_token_lifetime: Duration,

    /// Update `last_login` whenever a token pair is issued
    pub update_last_login: bool,

    /// Failed token requests allowed per IP per minute (0 = no throttling)
    pub login_failure_limit: u32,

    // =========================================================================
    // Admin
    // =========================================================================
    /// API key for `/admin` endpoints (optional - when unset, the admin API
    /// is not mounted)
    pub admin_api_key: Option<String>,

    // =========================================================================
    // Observability
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration value is invalid
    /// (e.g., non-numeric PORT value, short signing key).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 64 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Storage
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "ip_whitelist.db".to_string()),

            // Whitelist gate
            settings_source: SettingsSource::from_env(),
            gate_bypass_paths: Self::parse_list("GATE_BYPASS_PATHS", "")
                .into_iter()
                .filter(|p| p.starts_with('/'))
                .collect(),

            // Authentication
            create_unknown_user: Self::parse_env("CREATE_UNKNOWN_USER", true)?,
            signing_key: env::var("JWT_SIGNING_KEY").ok().filter(|k| !k.is_empty()),
            access_token_lifetime: Duration::from_secs(Self::parse_env(
                "ACCESS_TOKEN_LIFETIME_SECS",
                300,
            )?),
            refresh_token_lifetime: Duration::from_secs(Self::parse_env(
                "REFRESH_TOKEN_LIFETIME_SECS",
                86_400,
            )?),
            update_last_login: Self::parse_env("UPDATE_LAST_LOGIN", false)?,
            login_failure_limit: Self::parse_env("LOGIN_FAILURE_LIMIT", 10)?,

            // Admin
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_log_format()?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.access_token_lifetime.is_zero() {
            return Err(AppError::ConfigError(
                "ACCESS_TOKEN_LIFETIME_SECS must be greater than 0".to_string(),
            ));
        }

        if self.refresh_token_lifetime < self.access_token_lifetime {
            return Err(AppError::ConfigError(format!(
                "REFRESH_TOKEN_LIFETIME_SECS ({:?}) must be >= ACCESS_TOKEN_LIFETIME_SECS ({:?})",
                self.refresh_token_lifetime, self.access_token_lifetime
            )));
        }

        if let Some(key) = &self.signing_key
            && key.len() < MIN_SIGNING_KEY_LENGTH
        {
            return Err(AppError::ConfigError(format!(
                "JWT_SIGNING_KEY must be at least {MIN_SIGNING_KEY_LENGTH} bytes"
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if admin API key authentication is enabled.
    pub fn admin_auth_enabled(&self) -> bool {
        self.admin_api_key.is_some()
    }

    /// Check if failed-login throttling is enabled.
    pub fn login_throttle_enabled(&self) -> bool {
        self.login_failure_limit > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping blank items.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_log_format() -> AppResult<LogFormat> {
        match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "" | "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::ConfigError(format!(
                "Invalid LOG_FORMAT: {other} (expected 'text' or 'json')"
            ))),
        }
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_request_body_size: 64 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            database_path: ":memory:".to_string(),
            settings_source: SettingsSource::Defaults,
            gate_bypass_paths: vec![],
            create_unknown_user: true,
            signing_key: None,
            access_token_lifetime: Duration::from_secs(300),
            refresh_token_lifetime: Duration::from_secs(86_400),
            update_last_login: false,
            login_failure_limit: 10,
            admin_api_key: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.port, 8000);
        assert!(config.create_unknown_user);
        assert!(!config.update_last_login);
        assert_eq!(config.access_token_lifetime, Duration::from_secs(300));
        assert!(config.gate_bypass_paths.is_empty());
        assert!(config.admin_api_key.is_none());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_feature_toggles() {
        let config = Config::default();
        assert!(!config.admin_auth_enabled());
        assert!(config.login_throttle_enabled());
        assert!(!config.metrics_enabled());
        assert!(config.metrics_addr().is_none());

        let config = Config {
            admin_api_key: Some("admin-secret".to_string()),
            login_failure_limit: 0,
            metrics_port: 9100,
            ..Config::default()
        };
        assert!(config.admin_auth_enabled());
        assert!(!config.login_throttle_enabled());
        assert_eq!(config.metrics_addr().unwrap().port(), 9100);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_access_lifetime() {
        let config = Config {
            access_token_lifetime: Duration::ZERO,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_LIFETIME_SECS"));
    }

    #[test]
    fn test_validate_refresh_shorter_than_access() {
        let config = Config {
            access_token_lifetime: Duration::from_secs(600),
            refresh_token_lifetime: Duration::from_secs(60),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REFRESH_TOKEN_LIFETIME_SECS"));
    }

    #[test]
    fn test_validate_short_signing_key() {
        let config = Config {
            signing_key: Some("too-short".to_string()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JWT_SIGNING_KEY"));
    }

    #[test]
    fn test_validate_zero_body_size() {
        let config = Config {
            max_request_body_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
