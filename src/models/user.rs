use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account that tokens are issued for.
///
/// Users provisioned through IP resolution have no password hash and can
/// only authenticate from a whitelisted address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_usable_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Admin request to create a user.
#[derive(Debug, Deserialize)]
pub struct NewUserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
