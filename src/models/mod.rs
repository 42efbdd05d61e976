mod api;
mod user;
mod whitelist;

pub use api::{
    HealthResponse, SettingResponse, SettingsReloadResponse, TokenObtainRequest,
    TokenPairResponse, TokenRefreshRequest, TokenRefreshResponse, WhoAmIResponse,
};
pub use user::{NewUserRequest, User};
pub use whitelist::{WhitelistEntry, WhitelistEntryInput};
