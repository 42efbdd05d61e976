use std::fmt;

use serde::{Deserialize, Serialize};

/// A stored association between an IP address and an optional username.
///
/// Entries without a username only take part in the allow-set check of the
/// request gate; they never resolve to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Surrogate identifier assigned by the store
    pub id: i64,
    /// Canonical IPv4/IPv6 literal, unique across entries
    pub ip_address: String,
    /// Inactive entries are ignored by every lookup
    pub is_active: bool,
    /// Username used for identity resolution
    pub username: Option<String>,
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let availability = if self.is_active {
            "available"
        } else {
            "not available"
        };
        write!(f, "{}: {}", self.ip_address, availability)
    }
}

/// Payload used to create or replace a whitelist entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistEntryInput {
    pub ip_address: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub username: Option<String>,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_active_entry() {
        let entry = WhitelistEntry {
            id: 1,
            ip_address: "10.0.0.1".to_string(),
            is_active: true,
            username: None,
        };
        assert_eq!(entry.to_string(), "10.0.0.1: available");
    }

    #[test]
    fn test_display_inactive_entry() {
        let entry = WhitelistEntry {
            id: 2,
            ip_address: "::1".to_string(),
            is_active: false,
            username: Some("alice".to_string()),
        };
        assert_eq!(entry.to_string(), "::1: not available");
    }

    #[test]
    fn test_input_defaults() {
        let input: WhitelistEntryInput =
            serde_json::from_str(r#"{"ip_address": "192.168.0.10"}"#).unwrap();
        assert!(input.is_active);
        assert!(input.username.is_none());
    }
}
