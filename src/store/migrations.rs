//! Schema for the SQLite store.

/// SQL statement to create the schema. Safe to run on every startup.
pub const CREATE_SCHEMA: &str = r#"
-- IP whitelist entries
CREATE TABLE IF NOT EXISTS auth_ip_whitelist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_address TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 1,
    username TEXT
);

CREATE INDEX IF NOT EXISTS idx_whitelist_ip_active ON auth_ip_whitelist(ip_address, is_active);

-- Accounts tokens are issued for
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    date_joined TEXT NOT NULL,
    last_login TEXT
);
"#;
