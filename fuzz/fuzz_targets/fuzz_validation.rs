//! Fuzz testing for input parsing.
//!
//! Every function here takes client- or operator-supplied text and must
//! return a `Result`/`Option` for any input, never panic.
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! Covered:
//!
//! - `canonical_ip` / `validate_ip_address`: whitelist entries and client IPs
//! - `validate_username`, `normalize_entry_username`
//! - `WhitelistSettings::from_block`: the `AUTH_IP_WHITELIST` JSON block
//! - `TokenSigner::verify`: bearer and refresh tokens

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use ip_whitelist_auth::auth::{TokenSigner, TokenType};
use ip_whitelist_auth::settings::WhitelistSettings;
use ip_whitelist_auth::validation::{
    canonical_ip, normalize_entry_username, validate_ip_address, validate_username,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // A canonical form must be a fixed point
        if let Some(canonical) = canonical_ip(s) {
            assert_eq!(canonical_ip(&canonical).as_deref(), Some(canonical.as_str()));
        }
        let _ = validate_ip_address(s);

        let _ = validate_username(s);
        let _ = normalize_entry_username(Some(s.to_string()));

        let _ = WhitelistSettings::from_block(Some(s));

        let signer = TokenSigner::new(
            "fuzz-signing-key-fuzz-signing-key",
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let _ = signer.verify(s, TokenType::Access);
        let _ = signer.verify(s, TokenType::Refresh);
    }
});
