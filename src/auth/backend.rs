//! Authentication backends.
//!
//! [`IpAuthBackend`] resolves a user from the client IP through the active
//! whitelist entry for that address. [`PasswordBackend`] is the ordinary
//! username/password check. Neither treats "no user" as an error: both return
//! `Ok(None)` and leave it to the caller to decide what a failed
//! authentication means.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::password::verify_password_blocking;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::User;
use crate::store::{Store, UserStore, WhitelistStore};

/// Whether an account may authenticate at all.
///
/// Applied by every backend after the user has been resolved.
pub fn user_can_authenticate(user: &User) -> bool {
    user.is_active
}

/// Resolves users from whitelisted IP addresses.
#[derive(Clone)]
pub struct IpAuthBackend {
    store: Arc<dyn Store>,
    create_unknown_user: bool,
}

impl IpAuthBackend {
    /// # Arguments
    ///
    /// * `store` - Whitelist and user storage
    /// * `create_unknown_user` - Provision a user for a whitelisted username
    ///   that has no account yet. When false only existing users resolve.
    pub fn new(store: Arc<dyn Store>, create_unknown_user: bool) -> Self {
        Self {
            store,
            create_unknown_user,
        }
    }

    /// Username mapped to the active whitelist entry for `ip`.
    pub async fn username_for_ip(&self, ip: &str) -> AppResult<Option<String>> {
        let entry = self.store.active_entry_for_ip(ip).await?;
        Ok(entry.and_then(|e| e.username))
    }

    /// Resolve the user for `ip`.
    ///
    /// An absent or empty IP resolves to nothing without touching the store.
    pub async fn authenticate(&self, ip: Option<&str>) -> AppResult<Option<User>> {
        let Some(ip) = ip.map(str::trim).filter(|ip| !ip.is_empty()) else {
            metrics::record_ip_resolution("no_ip");
            return Ok(None);
        };

        let Some(username) = self.username_for_ip(ip).await? else {
            debug!(client_ip = ip, "No active whitelist entry with a username");
            metrics::record_ip_resolution("no_entry");
            return Ok(None);
        };

        let user = if self.create_unknown_user {
            let (user, created) = self.store.get_or_create_user(&username).await?;
            if created {
                self.configure_user(&user, ip);
            }
            Some(user)
        } else {
            self.store.get_user_by_username(&username).await?
        };

        let Some(user) = user else {
            debug!(client_ip = ip, username = %username, "Whitelisted username has no account");
            metrics::record_ip_resolution("no_user");
            return Ok(None);
        };

        if !user_can_authenticate(&user) {
            debug!(client_ip = ip, user_id = user.id, "Resolved user is inactive");
            metrics::record_ip_resolution("inactive");
            return Ok(None);
        }

        metrics::record_ip_resolution("resolved");
        Ok(Some(user))
    }

    /// Hook run once for each newly provisioned user.
    fn configure_user(&self, user: &User, ip: &str) {
        info!(
            user_id = user.id,
            username = %user.username,
            client_ip = ip,
            "Provisioned user from IP whitelist"
        );
        metrics::record_user_provisioned();
    }
}

/// Username/password authentication against stored Argon2 hashes.
#[derive(Clone)]
pub struct PasswordBackend {
    store: Arc<dyn Store>,
}

impl PasswordBackend {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Missing credentials, unknown users, users without a usable password
    /// and inactive users all resolve to nothing.
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<Option<User>> {
        let (Some(username), Some(password)) = (username, password) else {
            return Ok(None);
        };

        let Some(user) = self.store.get_user_by_username(username).await? else {
            return Ok(None);
        };
        let Some(hash) = user.password_hash.clone().filter(|_| user.has_usable_password()) else {
            return Ok(None);
        };

        let verified = verify_password_blocking(password.to_string(), hash).await;
        if !password_matched(username, verified) {
            return Ok(None);
        }

        Ok(user_can_authenticate(&user).then_some(user))
    }
}

/// A verification that could not run counts as a mismatch.
fn password_matched(username: &str, verified: Result<bool, AppError>) -> bool {
    verified.unwrap_or_else(|e| {
        warn!(username, error = %e, "Password verification failed to run");
        false
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::store::SqliteStore;

    async fn store() -> Arc<dyn Store> {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_entry("10.0.0.1", true, Some("alice")).await.unwrap();
        store.create_entry("10.0.0.2", false, Some("bob")).await.unwrap();
        store.create_entry("10.0.0.3", true, None).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_empty_ip_resolves_nothing() {
        let backend = IpAuthBackend::new(store().await, true);
        assert!(backend.authenticate(None).await.unwrap().is_none());
        assert!(backend.authenticate(Some("")).await.unwrap().is_none());
        assert!(backend.authenticate(Some("  ")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_ip_resolves_nothing() {
        let backend = IpAuthBackend::new(store().await, true);
        assert!(backend.authenticate(Some("10.9.9.9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_entry_resolves_nothing() {
        let store = store().await;
        let backend = IpAuthBackend::new(store.clone(), true);

        assert!(backend.authenticate(Some("10.0.0.2")).await.unwrap().is_none());
        assert!(store.get_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_without_username_resolves_nothing() {
        let backend = IpAuthBackend::new(store().await, true);
        assert!(backend.authenticate(Some("10.0.0.3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_username_is_provisioned_once() {
        let store = store().await;
        let backend = IpAuthBackend::new(store.clone(), true);

        let first = backend.authenticate(Some("10.0.0.1")).await.unwrap().unwrap();
        let second = backend.authenticate(Some("10.0.0.1")).await.unwrap().unwrap();

        assert_eq!(first.username, "alice");
        assert_eq!(first.id, second.id);
        assert!(!first.has_usable_password());
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_creates_one_user() {
        let store = store().await;
        let backend = IpAuthBackend::new(store.clone(), true);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.authenticate(Some("10.0.0.1")).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().unwrap().id);
        }

        assert_eq!(ids[0], ids[1]);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_requires_existing_user() {
        let store = store().await;
        let backend = IpAuthBackend::new(store.clone(), false);

        assert!(backend.authenticate(Some("10.0.0.1")).await.unwrap().is_none());
        assert!(store.list_users().await.unwrap().is_empty());

        store.create_user("alice", None, true).await.unwrap();
        let user = backend.authenticate(Some("10.0.0.1")).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_inactive_user_resolves_nothing() {
        let store = store().await;
        store.create_user("alice", None, false).await.unwrap();
        let backend = IpAuthBackend::new(store, true);

        assert!(backend.authenticate(Some("10.0.0.1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_password_backend() {
        let store = store().await;
        let hash = hash_password("s3cret-pass").unwrap();
        store.create_user("carol", Some(&hash), true).await.unwrap();
        store.create_user("dave", Some(&hash), false).await.unwrap();
        store.create_user("erin", None, true).await.unwrap();
        let backend = PasswordBackend::new(store);

        let user = backend
            .authenticate(Some("carol"), Some("s3cret-pass"))
            .await
            .unwrap();
        assert_eq!(user.unwrap().username, "carol");

        assert!(backend.authenticate(Some("carol"), Some("wrong")).await.unwrap().is_none());
        assert!(backend.authenticate(Some("carol"), None).await.unwrap().is_none());
        assert!(backend.authenticate(None, Some("s3cret-pass")).await.unwrap().is_none());
        assert!(backend.authenticate(Some("nobody"), Some("x")).await.unwrap().is_none());
        assert!(backend.authenticate(Some("dave"), Some("s3cret-pass")).await.unwrap().is_none());
        assert!(backend.authenticate(Some("erin"), Some("")).await.unwrap().is_none());
    }

    #[test]
    fn test_verification_failure_counts_as_mismatch() {
        assert!(password_matched("carol", Ok(true)));
        assert!(!password_matched("carol", Ok(false)));
        assert!(!password_matched(
            "carol",
            Err(AppError::Internal("task panicked".to_string()))
        ));
    }
}
