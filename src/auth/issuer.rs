//! Token issuing with IP fallback.
//!
//! Password authentication is tried first. When it does not produce an
//! active user, the client IP attached by the whitelist gate is resolved
//! through [`IpAuthBackend`]. Only when both fail is the request rejected
//! with `no_active_account`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::backend::{IpAuthBackend, PasswordBackend, user_can_authenticate};
use super::tokens::TokenSigner;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::ClientIp;
use crate::models::{TokenObtainRequest, TokenPairResponse, User};
use crate::store::{Store, UserStore};

/// How the user behind an issued pair was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    Ip,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::Ip => "ip",
        }
    }
}

/// A freshly issued pair and who it was issued to.
#[derive(Debug)]
pub struct IssuedTokens {
    pub tokens: TokenPairResponse,
    pub user: User,
    pub method: AuthMethod,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn Store>,
    password_backend: PasswordBackend,
    ip_backend: IpAuthBackend,
    signer: Arc<TokenSigner>,
    update_last_login: bool,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn Store>,
        signer: Arc<TokenSigner>,
        create_unknown_user: bool,
        update_last_login: bool,
    ) -> Self {
        Self {
            password_backend: PasswordBackend::new(store.clone()),
            ip_backend: IpAuthBackend::new(store.clone(), create_unknown_user),
            store,
            signer,
            update_last_login,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Authenticate the request and issue a token pair.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::no_active_account`] when neither the credentials
    /// nor the client IP identify an active user.
    pub async fn obtain_pair(
        &self,
        request: &TokenObtainRequest,
        client_ip: Option<&ClientIp>,
    ) -> AppResult<IssuedTokens> {
        let (user, method) = match self
            .password_backend
            .authenticate(request.username.as_deref(), request.password.as_deref())
            .await?
        {
            Some(user) => (user, AuthMethod::Password),
            None => {
                debug!(
                    username = request.username.as_deref().unwrap_or_default(),
                    "Password authentication failed, trying client IP"
                );
                match self
                    .ip_backend
                    .authenticate(client_ip.map(ClientIp::as_str))
                    .await?
                {
                    Some(user) if user_can_authenticate(&user) => (user, AuthMethod::Ip),
                    _ => {
                        metrics::record_login_failure();
                        return Err(AppError::no_active_account());
                    }
                }
            }
        };

        let tokens = self.signer.issue_pair(&user)?;

        if self.update_last_login {
            self.store.update_last_login(user.id, Utc::now()).await?;
        }

        metrics::record_token_issued(method.as_str());
        info!(
            user_id = user.id,
            username = %user.username,
            method = method.as_str(),
            "Issued token pair"
        );

        Ok(IssuedTokens {
            tokens,
            user,
            method,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::tokens::TokenType;
    use crate::store::{SqliteStore, WhitelistStore};

    async fn setup(update_last_login: bool) -> (Arc<dyn Store>, TokenIssuer) {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_entry("10.0.0.1", true, Some("kiosk")).await.unwrap();
        let hash = hash_password("s3cret-pass").unwrap();
        store.create_user("carol", Some(&hash), true).await.unwrap();

        let store: Arc<dyn Store> = Arc::new(store);
        let signer = Arc::new(TokenSigner::new(
            "0123456789abcdef0123456789abcdef",
            Duration::from_secs(300),
            Duration::from_secs(86400),
        ));
        let issuer = TokenIssuer::new(store.clone(), signer, true, update_last_login);
        (store, issuer)
    }

    fn credentials(username: &str, password: &str) -> TokenObtainRequest {
        TokenObtainRequest {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    fn ip(value: &str) -> ClientIp {
        ClientIp(value.to_string())
    }

    #[tokio::test]
    async fn test_password_success() {
        let (_, issuer) = setup(false).await;
        let issued = issuer
            .obtain_pair(&credentials("carol", "s3cret-pass"), Some(&ip("9.9.9.9")))
            .await
            .unwrap();

        assert_eq!(issued.method, AuthMethod::Password);
        assert_eq!(issued.user.username, "carol");
        let claims = issuer
            .signer()
            .verify(&issued.tokens.access, TokenType::Access)
            .unwrap();
        assert_eq!(claims.user_id, issued.user.id);
    }

    #[tokio::test]
    async fn test_bad_password_falls_back_to_ip() {
        let (_, issuer) = setup(false).await;
        let issued = issuer
            .obtain_pair(&credentials("carol", "wrong"), Some(&ip("10.0.0.1")))
            .await
            .unwrap();

        assert_eq!(issued.method, AuthMethod::Ip);
        assert_eq!(issued.user.username, "kiosk");
    }

    #[tokio::test]
    async fn test_no_credentials_uses_ip() {
        let (_, issuer) = setup(false).await;
        let issued = issuer
            .obtain_pair(&TokenObtainRequest::default(), Some(&ip("10.0.0.1")))
            .await
            .unwrap();

        assert_eq!(issued.method, AuthMethod::Ip);
    }

    #[tokio::test]
    async fn test_bad_password_and_unknown_ip_fails() {
        let (_, issuer) = setup(false).await;
        let err = issuer
            .obtain_pair(&credentials("carol", "wrong"), Some(&ip("9.9.9.9")))
            .await
            .unwrap_err();

        match err {
            AppError::AuthenticationFailed { code, message } => {
                assert_eq!(code, "no_active_account");
                assert_eq!(message, "No active account found with the given credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_ip_fails() {
        let (_, issuer) = setup(false).await;
        let result = issuer.obtain_pair(&TokenObtainRequest::default(), None).await;
        assert!(matches!(result, Err(AppError::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_last_login_updated_when_enabled() {
        let (store, issuer) = setup(true).await;
        issuer
            .obtain_pair(&credentials("carol", "s3cret-pass"), None)
            .await
            .unwrap();

        let user = store.get_user_by_username("carol").await.unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_last_login_untouched_when_disabled() {
        let (store, issuer) = setup(false).await;
        issuer
            .obtain_pair(&credentials("carol", "s3cret-pass"), None)
            .await
            .unwrap();

        let user = store.get_user_by_username("carol").await.unwrap().unwrap();
        assert!(user.last_login.is_none());
    }
}
