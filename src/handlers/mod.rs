mod health;
mod settings;
mod token;
mod users;
mod whitelist;

pub use health::{health_check, readiness_check};
pub use settings::{get_setting, reload_settings};
pub use token::{obtain_token_pair, refresh_token, whoami};
pub use users::{create_user, list_users};
pub use whitelist::{create_entry, delete_entry, get_entry, list_entries, update_entry};
