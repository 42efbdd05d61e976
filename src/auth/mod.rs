//! Authentication: password and IP backends, token signing and issuing,
//! and the failed-login throttle.

pub mod backend;
pub mod issuer;
pub mod password;
pub mod throttle;
pub mod tokens;

pub use backend::{IpAuthBackend, PasswordBackend, user_can_authenticate};
pub use issuer::{AuthMethod, IssuedTokens, TokenIssuer};
pub use throttle::LoginThrottle;
pub use tokens::{Claims, TokenError, TokenSigner, TokenType};
