//! SQLite implementation of the store traits
//!
//! Uses rusqlite through tokio-rusqlite. All calls run on the connection's
//! own thread one at a time, so every closure passed to `call` executes
//! atomically with respect to other store operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;
use tracing::debug;

use super::migrations::CREATE_SCHEMA;
use super::{Store, StoreError, UserStore, WhitelistStore};
use crate::models::{User, WhitelistEntry};

const ENTRY_COLUMNS: &str = "id, ip_address, is_active, username";
const USER_COLUMNS: &str = "id, username, password_hash, is_active, date_joined, last_login";

/// SQLite store implementation
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    ///
    /// Use `:memory:` for a throwaway in-memory database.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        debug!(path, "SQLite store opened");
        Ok(Self { conn })
    }

    /// Create a new in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:").await
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WhitelistEntry> {
    Ok(WhitelistEntry {
        id: row.get(0)?,
        ip_address: row.get(1)?,
        is_active: row.get(2)?,
        username: row.get(3)?,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_active: row.get(3)?,
        date_joined: row.get(4)?,
        last_login: row.get(5)?,
    })
}

/// Turn a UNIQUE violation into [`StoreError::Conflict`].
fn conflict_or(err: tokio_rusqlite::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl WhitelistStore for SqliteStore {
    async fn list_entries(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        let entries = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM auth_ip_whitelist ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map([], entry_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(entries)
    }

    async fn get_entry(&self, id: i64) -> Result<Option<WhitelistEntry>, StoreError> {
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        &format!("SELECT {ENTRY_COLUMNS} FROM auth_ip_whitelist WHERE id = ?1"),
                        [id],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    async fn create_entry(
        &self,
        ip_address: &str,
        is_active: bool,
        username: Option<&str>,
    ) -> Result<WhitelistEntry, StoreError> {
        let ip = ip_address.to_string();
        let username = username.map(str::to_string);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO auth_ip_whitelist (ip_address, is_active, username) VALUES (?1, ?2, ?3)",
                    params![ip, is_active, username],
                )?;
                Ok(WhitelistEntry {
                    id: conn.last_insert_rowid(),
                    ip_address: ip,
                    is_active,
                    username,
                })
            })
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!("Whitelist entry for {ip_address} already exists")
                })
            })
    }

    async fn update_entry(
        &self,
        id: i64,
        ip_address: &str,
        is_active: bool,
        username: Option<&str>,
    ) -> Result<Option<WhitelistEntry>, StoreError> {
        let ip = ip_address.to_string();
        let username = username.map(str::to_string);

        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE auth_ip_whitelist SET ip_address = ?1, is_active = ?2, username = ?3 WHERE id = ?4",
                    params![ip, is_active, username, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some(WhitelistEntry {
                    id,
                    ip_address: ip,
                    is_active,
                    username,
                }))
            })
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!("Whitelist entry for {ip_address} already exists")
                })
            })
    }

    async fn delete_entry(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM auth_ip_whitelist WHERE id = ?1", [id])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    async fn is_active_ip(&self, ip_address: &str) -> Result<bool, StoreError> {
        let ip = ip_address.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let found: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM auth_ip_whitelist WHERE ip_address = ?1 AND is_active = 1)",
                    [&ip],
                    |row| row.get(0),
                )?;
                Ok(found)
            })
            .await?;
        Ok(found)
    }

    async fn active_entry_for_ip(
        &self,
        ip_address: &str,
    ) -> Result<Option<WhitelistEntry>, StoreError> {
        let ip = ip_address.to_string();
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        &format!(
                            "SELECT {ENTRY_COLUMNS} FROM auth_ip_whitelist WHERE ip_address = ?1 AND is_active = 1"
                        ),
                        [&ip],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        [id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                        [&username],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    async fn get_or_create_user(&self, username: &str) -> Result<(User, bool), StoreError> {
        let username = username.to_string();
        let now = Utc::now();

        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT INTO users (username, password_hash, is_active, date_joined) \
                     VALUES (?1, NULL, 1, ?2) ON CONFLICT(username) DO NOTHING",
                    params![username, now],
                )?;
                let user = tx.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                    [&username],
                    user_from_row,
                )?;
                tx.commit()?;
                Ok((user, inserted == 1))
            })
            .await?;
        Ok(result)
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: Option<&str>,
        is_active: bool,
    ) -> Result<User, StoreError> {
        let name = username.to_string();
        let password_hash = password_hash.map(str::to_string);
        let now = Utc::now();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (username, password_hash, is_active, date_joined) VALUES (?1, ?2, ?3, ?4)",
                    params![name, password_hash, is_active, now],
                )?;
                Ok(User {
                    id: conn.last_insert_rowid(),
                    username: name,
                    password_hash,
                    is_active,
                    date_joined: now,
                    last_login: None,
                })
            })
            .await
            .map_err(|e| conflict_or(e, || format!("User {username} already exists")))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
                let rows = stmt
                    .query_map([], user_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(users)
    }

    async fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET last_login = ?1 WHERE id = ?2",
                    params![at, user_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let store = SqliteStore::in_memory().await;
        assert!(store.is_ok());
        assert!(store.unwrap().ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_and_list_entries() {
        let store = SqliteStore::in_memory().await.unwrap();

        let first = store
            .create_entry("10.0.0.1", true, Some("alice"))
            .await
            .unwrap();
        store.create_entry("10.0.0.2", false, None).await.unwrap();

        let entries = store.list_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], first);
        assert_eq!(entries[1].ip_address, "10.0.0.2");
        assert!(!entries[1].is_active);
        assert!(entries[1].username.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ip_is_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_entry("10.0.0.1", true, None).await.unwrap();

        let err = store.create_entry("10.0.0.1", false, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_entry() {
        let store = SqliteStore::in_memory().await.unwrap();
        let entry = store.create_entry("10.0.0.1", true, None).await.unwrap();

        let updated = store
            .update_entry(entry.id, "10.0.0.9", false, Some("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.ip_address, "10.0.0.9");
        assert_eq!(updated.username.as_deref(), Some("bob"));

        let fetched = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn test_update_missing_entry_returns_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.update_entry(42, "10.0.0.1", true, None).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_into_existing_ip_is_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_entry("10.0.0.1", true, None).await.unwrap();
        let second = store.create_entry("10.0.0.2", true, None).await.unwrap();

        let err = store
            .update_entry(second.id, "10.0.0.1", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let store = SqliteStore::in_memory().await.unwrap();
        let entry = store.create_entry("10.0.0.1", true, None).await.unwrap();

        assert!(store.delete_entry(entry.id).await.unwrap());
        assert!(!store.delete_entry(entry.id).await.unwrap());
        assert!(store.get_entry(entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_lookups_ignore_inactive_entries() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_entry("10.0.0.1", true, Some("alice")).await.unwrap();
        store.create_entry("10.0.0.2", false, Some("bob")).await.unwrap();

        assert!(store.is_active_ip("10.0.0.1").await.unwrap());
        assert!(!store.is_active_ip("10.0.0.2").await.unwrap());
        assert!(!store.is_active_ip("10.0.0.3").await.unwrap());

        let entry = store.active_entry_for_ip("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(entry.username.as_deref(), Some("alice"));
        assert!(store.active_entry_for_ip("10.0.0.2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();

        let (first, created) = store.get_or_create_user("carol").await.unwrap();
        assert!(created);
        assert!(first.is_active);
        assert!(!first.has_usable_password());

        let (second, created) = store.get_or_create_user("carol").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_user() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create_user("dave").await })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created_count = 0;
        for handle in handles {
            let (user, created) = handle.await.unwrap().unwrap();
            ids.push(user.id);
            if created {
                created_count += 1;
            }
        }

        assert_eq!(created_count, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_user_duplicate_is_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_user("erin", Some("hash"), true).await.unwrap();

        let err = store.create_user("erin", None, true).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = store.create_user("frank", None, true).await.unwrap();
        assert!(user.last_login.is_none());

        let at = Utc::now();
        store.update_last_login(user.id, at).await.unwrap();

        let fetched = store.get_user(user.id).await.unwrap().unwrap();
        let last_login = fetched.last_login.unwrap();
        assert_eq!(last_login.timestamp(), at.timestamp());
    }
}
