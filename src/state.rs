//! Shared application state for Axum handlers.
//!
//! Holds the store, the reloadable whitelist settings, the token issuer and
//! the login throttle. Everything is behind `Arc` (or is itself a cheap
//! handle), so cloning the state per request is cheap.
//!
//! # Structured Concurrency
//!
//! The SIGHUP settings-reload listener is tracked by a `TaskTracker` and
//! stopped through a `CancellationToken`. Call `shutdown()` before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::auth::{LoginThrottle, TokenIssuer, TokenSigner};
use crate::config::Config;
use crate::settings::SharedSettings;
use crate::store::Store;

/// Shared application state.
///
/// ```rust,ignore
/// let state = AppState::new(store, settings, config);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Reloadable `AUTH_IP_WHITELIST` settings
    pub settings: SharedSettings,
    pub config: Arc<Config>,
    pub issuer: TokenIssuer,
    pub throttle: LoginThrottle,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state and start the background reload listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn Store>, settings: SharedSettings, config: Config) -> Self {
        let signer = match &config.signing_key {
            Some(key) => TokenSigner::new(
                key.as_bytes(),
                config.access_token_lifetime,
                config.refresh_token_lifetime,
            ),
            None => {
                warn!("JWT_SIGNING_KEY not set, using a random key; tokens will not survive a restart");
                TokenSigner::with_random_key(
                    config.access_token_lifetime,
                    config.refresh_token_lifetime,
                )
            }
        };

        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(signer),
            config.create_unknown_user,
            config.update_last_login,
        );
        let throttle = LoginThrottle::new(config.login_failure_limit);

        let state = Self {
            store,
            settings,
            config: Arc::new(config),
            issuer,
            throttle,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        #[cfg(unix)]
        state.spawn_settings_reload_task();

        state
    }

    /// Reload settings whenever the process receives SIGHUP.
    #[cfg(unix)]
    fn spawn_settings_reload_task(&self) {
        let settings = self.settings.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut hangup = match crate::utils::reload_signal() {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGHUP handler, settings reload by signal disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        tracing::debug!("Settings reload task received cancellation signal");
                        break;
                    }
                    received = hangup.recv() => {
                        if received.is_none() {
                            break;
                        }
                        info!("Received SIGHUP, reloading whitelist settings");
                        // Failures are logged by reload and the old settings stay
                        let _ = settings.reload().await;
                    }
                }
            }
        });
    }

    /// Gracefully stop background tasks and wait for them.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::settings::{SettingsSource, WhitelistSettings};
    use crate::store::SqliteStore;

    async fn state(config: Config) -> AppState {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let settings = SharedSettings::new(SettingsSource::Defaults, WhitelistSettings::default());
        AppState::new(store, settings, config)
    }

    #[tokio::test]
    async fn test_configured_key_is_used() {
        let config = Config {
            signing_key: Some("0123456789abcdef0123456789abcdef".to_string()),
            ..Config::default()
        };
        let a = state(config.clone()).await;
        let b = state(config).await;

        let token = a
            .issuer
            .signer()
            .issue(1, crate::auth::TokenType::Access)
            .unwrap();
        assert!(b.issuer.signer().verify(&token, crate::auth::TokenType::Access).is_ok());

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_throttle_follows_config() {
        let enabled = state(Config {
            login_failure_limit: 3,
            ..Config::default()
        })
        .await;
        let disabled = state(Config {
            login_failure_limit: 0,
            ..Config::default()
        })
        .await;

        assert!(enabled.throttle.is_enabled());
        assert!(!disabled.throttle.is_enabled());
    }

    #[tokio::test]
    async fn test_shutdown_completes() {
        let state = state(Config::default()).await;
        tokio::time::timeout(std::time::Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
