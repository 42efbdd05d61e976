//! Wire-format tests for the public models.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use serde_json::json;

mod whitelist_tests {
    use super::*;
    use ip_whitelist_auth::models::{WhitelistEntry, WhitelistEntryInput};

    #[test]
    fn test_entry_serialization() {
        let entry = WhitelistEntry {
            id: 3,
            ip_address: "10.0.0.1".to_string(),
            is_active: true,
            username: Some("alice".to_string()),
        };

        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({ "id": 3, "ip_address": "10.0.0.1", "is_active": true, "username": "alice" })
        );
    }

    #[test]
    fn test_entry_display() {
        let mut entry = WhitelistEntry {
            id: 1,
            ip_address: "192.168.0.7".to_string(),
            is_active: true,
            username: None,
        };
        assert_eq!(entry.to_string(), "192.168.0.7: available");

        entry.is_active = false;
        assert_eq!(entry.to_string(), "192.168.0.7: not available");
    }

    #[test]
    fn test_entry_input_minimal() {
        let input: WhitelistEntryInput =
            serde_json::from_value(json!({ "ip_address": "10.0.0.1" })).unwrap();

        assert!(input.is_active);
        assert!(input.username.is_none());
    }

    #[test]
    fn test_entry_input_requires_ip() {
        let result: Result<WhitelistEntryInput, _> =
            serde_json::from_value(json!({ "username": "alice" }));
        assert!(result.is_err());
    }
}

mod user_tests {
    use super::*;
    use ip_whitelist_auth::models::{NewUserRequest, User};

    #[test]
    fn test_password_hash_is_never_serialized() {
        let user = User {
            id: 1,
            username: "carol".to_string(),
            password_hash: Some("$argon2id$v=19$...".to_string()),
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        };

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["username"], "carol");
        assert!(value["last_login"].is_null());
        assert!(user.has_usable_password());
    }

    #[test]
    fn test_ip_provisioned_user_has_no_usable_password() {
        let user = User {
            id: 2,
            username: "kiosk".to_string(),
            password_hash: None,
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        };
        assert!(!user.has_usable_password());
    }

    #[test]
    fn test_new_user_request_defaults() {
        let request: NewUserRequest =
            serde_json::from_value(json!({ "username": "dave" })).unwrap();
        assert!(request.password.is_none());
        assert!(request.is_active);
    }
}

mod api_tests {
    use super::*;
    use ip_whitelist_auth::models::{
        HealthResponse, TokenObtainRequest, TokenPairResponse, WhoAmIResponse,
    };

    #[test]
    fn test_token_request_fields_are_optional() {
        let request: TokenObtainRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.username.is_none());
        assert!(request.password.is_none());

        let request: TokenObtainRequest =
            serde_json::from_value(json!({ "username": "carol" })).unwrap();
        assert_eq!(request.username.as_deref(), Some("carol"));
        assert!(request.password.is_none());
    }

    #[test]
    fn test_token_pair_shape() {
        let pair = TokenPairResponse {
            refresh: "r".to_string(),
            access: "a".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&pair).unwrap(),
            json!({ "refresh": "r", "access": "a" })
        );
    }

    #[test]
    fn test_whoami_shape() {
        let response = WhoAmIResponse {
            user_id: 9,
            username: "kiosk".to_string(),
            client_ip: Some("10.0.0.1".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "user_id": 9, "username": "kiosk", "client_ip": "10.0.0.1" })
        );
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "healthy");
        assert!(value["timestamp"].is_string());
    }
}

mod config_tests {
    use ip_whitelist_auth::Config;
    use ip_whitelist_auth::settings::SettingsSource;

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert!(config.create_unknown_user);
        assert!(!config.update_last_login);
        assert!(config.gate_bypass_paths.is_empty());
        assert_eq!(config.settings_source, SettingsSource::Defaults);
        assert_eq!(config.access_token_lifetime.as_secs(), 300);
        assert_eq!(config.refresh_token_lifetime.as_secs(), 86_400);
    }
}
