use std::net::IpAddr;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for usernames, matching the store column width.
pub const MAX_USERNAME_LENGTH: usize = 255;

/// Minimum length for passwords set through the admin API.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Parse an IP literal and return its canonical textual form.
///
/// IPv6 addresses are compressed (`2001:0db8::0001` becomes `2001:db8::1`)
/// so that stored entries, configured hosts and client addresses compare
/// equal regardless of how they were written.
pub fn canonical_ip(raw: &str) -> Option<String> {
    raw.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

/// Validate an IP literal, returning its canonical form.
pub fn validate_ip_address(raw: &str) -> AppResult<String> {
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest(
            "IP address cannot be empty".to_string(),
        ));
    }

    canonical_ip(raw).ok_or_else(|| {
        AppError::BadRequest(format!("'{raw}' is not a valid IPv4 or IPv6 address"))
    })
}

/// Validate a username.
///
/// Rules:
/// - Must be between 1 and 255 characters
/// - Must not contain whitespace or control characters
pub fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::BadRequest("Username cannot be empty".to_string()));
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Username cannot exceed {MAX_USERNAME_LENGTH} characters"
        )));
    }

    if let Some((i, c)) = username
        .chars()
        .enumerate()
        .find(|(_, c)| c.is_whitespace() || c.is_control())
    {
        return Err(AppError::BadRequest(format!(
            "Username contains invalid character {c:?} at position {i}"
        )));
    }

    Ok(())
}

/// Validate an optional username attached to a whitelist entry.
///
/// Blank values are normalised to `None`.
pub fn normalize_entry_username(username: Option<String>) -> AppResult<Option<String>> {
    match username {
        Some(name) if name.trim().is_empty() => Ok(None),
        Some(name) => {
            validate_username(&name)?;
            Ok(Some(name))
        }
        None => Ok(None),
    }
}

/// Validate a password supplied for a new user.
pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
