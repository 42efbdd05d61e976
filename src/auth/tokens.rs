//! HS256 access/refresh tokens.
//!
//! Tokens are compact JWTs (`header.claims.signature`, base64url without
//! padding) signed with HMAC-SHA256. Claims carry the token type, so a
//! refresh token is never accepted where an access token is expected and
//! vice versa.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{TokenPairResponse, User};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYP: &str = "JWT";

/// Length of the key generated when none is configured.
const GENERATED_KEY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not made of three segments")]
    Malformed,
    #[error("token segment is not valid base64url")]
    Encoding,
    #[error("token segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("expected a {expected} token")]
    WrongType { expected: TokenType },
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    /// Issued at, seconds since the Unix epoch
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    pub user_id: i64,
}

/// Signs and verifies tokens with a single HMAC key.
pub struct TokenSigner {
    key: Vec<u8>,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key", &"<redacted>")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(key: impl Into<Vec<u8>>, access_lifetime: Duration, refresh_lifetime: Duration) -> Self {
        Self {
            key: key.into(),
            access_lifetime,
            refresh_lifetime,
        }
    }

    /// Signer with a fresh random key.
    ///
    /// Tokens issued by it do not survive a restart.
    pub fn with_random_key(access_lifetime: Duration, refresh_lifetime: Duration) -> Self {
        let mut key = [0u8; GENERATED_KEY_BYTES];
        rand::rng().fill_bytes(&mut key);
        Self::new(key.to_vec(), access_lifetime, refresh_lifetime)
    }

    /// Issue a refresh/access pair for `user`.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPairResponse, TokenError> {
        Ok(TokenPairResponse {
            refresh: self.issue(user.id, TokenType::Refresh)?,
            access: self.issue(user.id, TokenType::Access)?,
        })
    }

    /// Exchange a valid refresh token for a new access token.
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;
        self.issue(claims.user_id, TokenType::Access)
    }

    pub fn issue(&self, user_id: i64, token_type: TokenType) -> Result<String, TokenError> {
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };
        let iat = Utc::now().timestamp();
        let lifetime_secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            token_type,
            exp: iat.saturating_add(lifetime_secs),
            iat,
            jti: Uuid::new_v4().simple().to_string(),
            user_id,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYP.to_string(),
        };
        let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature = self.mac(signing_input.as_bytes())?;
        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Check signature, expiry and type, returning the claims.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = serde_json::from_slice(&decode_segment(header_b64)?)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let expected_signature = self.mac(signing_input.as_bytes())?;
        let signature = decode_segment(signature_b64)?;
        if !bool::from(signature.as_slice().ct_eq(expected_signature.as_slice())) {
            return Err(TokenError::InvalidSignature);
        }

        let claims: Claims = serde_json::from_slice(&decode_segment(claims_b64)?)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        if claims.token_type != expected {
            return Err(TokenError::WrongType { expected });
        }

        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|e| TokenError::Signing(e.to_string()))?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::Encoding)
}
