//! Persistence for whitelist entries and users.
//!
//! The request gate and the IP authentication backend read through these
//! traits on every request; nothing is cached in between so admin edits take
//! effect immediately.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{User, WhitelistEntry};

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite or connection failure
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// Uniqueness constraint violated
    #[error("{0}")]
    Conflict(String),
}

/// Whitelist entry persistence.
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// All entries ordered by id
    async fn list_entries(&self) -> Result<Vec<WhitelistEntry>, StoreError>;

    async fn get_entry(&self, id: i64) -> Result<Option<WhitelistEntry>, StoreError>;

    /// Insert a new entry. A duplicate `ip_address` yields [`StoreError::Conflict`].
    async fn create_entry(
        &self,
        ip_address: &str,
        is_active: bool,
        username: Option<&str>,
    ) -> Result<WhitelistEntry, StoreError>;

    /// Replace every field of an entry. Returns `None` if the id does not exist.
    async fn update_entry(
        &self,
        id: i64,
        ip_address: &str,
        is_active: bool,
        username: Option<&str>,
    ) -> Result<Option<WhitelistEntry>, StoreError>;

    /// Returns `true` if an entry was deleted
    async fn delete_entry(&self, id: i64) -> Result<bool, StoreError>;

    /// Whether an active entry exists for the IP
    async fn is_active_ip(&self, ip_address: &str) -> Result<bool, StoreError>;

    /// The single active entry for the IP, if any
    async fn active_entry_for_ip(
        &self,
        ip_address: &str,
    ) -> Result<Option<WhitelistEntry>, StoreError>;
}

/// User persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Atomically fetch the user or create it without a password.
    ///
    /// Concurrent calls for the same username resolve to one row; the flag
    /// is `true` only for the call that inserted it.
    async fn get_or_create_user(&self, username: &str) -> Result<(User, bool), StoreError>;

    /// Insert a new user. A duplicate username yields [`StoreError::Conflict`].
    async fn create_user(
        &self,
        username: &str,
        password_hash: Option<&str>,
        is_active: bool,
    ) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Everything the service needs from persistence.
#[async_trait]
pub trait Store: WhitelistStore + UserStore {
    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<(), StoreError>;
}
