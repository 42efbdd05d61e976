//! Reloadable whitelist settings.
//!
//! The `AUTH_IP_WHITELIST` block is a JSON object keyed by option name. It is
//! merged with static defaults once at startup into a [`WhitelistSettings`]
//! value and held by [`SharedSettings`], which is passed around through the
//! application state. Calling [`SharedSettings::reload`] re-reads the block
//! and swaps the value wholesale.
//!
//! # Example block
//!
//! ```json
//! { "ALLOWED_WHITELISTED_HOSTS": ["127.0.0.1", "10.0.0.5"] }
//! ```
//!
//! Unknown option names are rejected, both in the block and when looked up
//! by name through [`WhitelistSettings::option`].

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::validation::canonical_ip;

/// Name of the settings block (environment variable holding the JSON).
pub const SETTINGS_BLOCK: &str = "AUTH_IP_WHITELIST";

/// Dotenv file consulted for the block when reading from the environment.
pub const DOTENV_FILE: &str = ".env";

/// Environment variable naming a file that holds the settings block.
pub const SETTINGS_FILE_ENV: &str = "AUTH_IP_WHITELIST_FILE";

/// Option name for the statically allowed hosts.
pub const ALLOWED_WHITELISTED_HOSTS: &str = "ALLOWED_WHITELISTED_HOSTS";

/// Every option name the block accepts.
pub const OPTION_NAMES: [&str; 1] = [ALLOWED_WHITELISTED_HOSTS];

/// Hosts allowed when the block does not override them.
pub const DEFAULT_ALLOWED_HOSTS: [&str; 1] = ["127.0.0.1"];

/// User-supplied block. Every field is optional; missing ones fall back to
/// the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsBlock {
    #[serde(rename = "ALLOWED_WHITELISTED_HOSTS")]
    allowed_whitelisted_hosts: Option<Vec<String>>,
}

/// Resolved whitelist settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistSettings {
    /// Canonical IP literals that are always permitted, in configured order
    allowed_whitelisted_hosts: Vec<String>,
}

impl Default for WhitelistSettings {
    fn default() -> Self {
        Self {
            allowed_whitelisted_hosts: DEFAULT_ALLOWED_HOSTS
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
        }
    }
}

impl WhitelistSettings {
    /// Build settings from an allowed-hosts list, validating every literal.
    pub fn with_allowed_hosts<I, S>(hosts: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = Vec::new();
        for host in hosts {
            let host = host.as_ref();
            let ip = canonical_ip(host).ok_or_else(|| {
                AppError::ConfigError(format!(
                    "{ALLOWED_WHITELISTED_HOSTS} contains invalid IP address '{host}'"
                ))
            })?;
            if !allowed.contains(&ip) {
                allowed.push(ip);
            }
        }
        Ok(Self {
            allowed_whitelisted_hosts: allowed,
        })
    }

    /// Merge a JSON settings block with the defaults.
    ///
    /// `None` or a blank block yields the defaults.
    pub fn from_block(block: Option<&str>) -> AppResult<Self> {
        let block = match block.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Self::default()),
        };

        let parsed: SettingsBlock = serde_json::from_str(block).map_err(|e| {
            AppError::ConfigError(format!("Invalid {SETTINGS_BLOCK} settings: {e}"))
        })?;

        match parsed.allowed_whitelisted_hosts {
            Some(hosts) => Self::with_allowed_hosts(hosts),
            None => Ok(Self::default()),
        }
    }

    pub fn allowed_whitelisted_hosts(&self) -> &[String] {
        &self.allowed_whitelisted_hosts
    }

    /// Whether the canonical IP is statically allowed.
    pub fn allows_host(&self, ip: &str) -> bool {
        self.allowed_whitelisted_hosts.iter().any(|h| h == ip)
    }

    /// Look up a resolved option by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for names that are not settings options.
    pub fn option(&self, name: &str) -> AppResult<serde_json::Value> {
        match name {
            ALLOWED_WHITELISTED_HOSTS => Ok(serde_json::json!(self.allowed_whitelisted_hosts)),
            _ => Err(AppError::ConfigError(format!(
                "Invalid auth ip whitelist setting: '{name}'"
            ))),
        }
    }
}

/// Where the settings block is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// `AUTH_IP_WHITELIST` from the `.env` file when it defines it,
    /// otherwise from the process environment
    Environment,
    /// A JSON file
    File(PathBuf),
    /// No block; always the defaults
    Defaults,
}

impl SettingsSource {
    /// Pick the source from the environment: a file if
    /// `AUTH_IP_WHITELIST_FILE` is set, otherwise the `AUTH_IP_WHITELIST`
    /// variable itself.
    pub fn from_env() -> Self {
        match env::var(SETTINGS_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => SettingsSource::File(PathBuf::from(path)),
            _ => SettingsSource::Environment,
        }
    }

    async fn read_block(&self) -> AppResult<Option<String>> {
        match self {
            SettingsSource::Environment => match block_from_dotenv(Path::new(DOTENV_FILE))? {
                Some(block) => Ok(Some(block)),
                None => Ok(env::var(SETTINGS_BLOCK).ok()),
            },
            SettingsSource::File(path) => {
                tokio::fs::read_to_string(path).await.map(Some).map_err(|e| {
                    AppError::ConfigError(format!(
                        "Cannot read settings file {}: {e}",
                        path.display()
                    ))
                })
            }
            SettingsSource::Defaults => Ok(None),
        }
    }

    /// Read and resolve the block.
    pub async fn resolve(&self) -> AppResult<WhitelistSettings> {
        let block = self.read_block().await?;
        WhitelistSettings::from_block(block.as_deref())
    }
}

/// Read the settings block from a dotenv file.
///
/// The process environment never changes after startup, so the file is
/// re-read on every resolve for reloads to see edits. A missing file or a
/// file without the block yields `None`.
fn block_from_dotenv(path: &Path) -> AppResult<Option<String>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return Ok(None),
        Err(e) => {
            return Err(AppError::ConfigError(format!(
                "Cannot read {}: {e}",
                path.display()
            )));
        }
    };

    for entry in entries {
        let (key, value) = entry.map_err(|e| {
            AppError::ConfigError(format!("Invalid entry in {}: {e}", path.display()))
        })?;
        if key == SETTINGS_BLOCK {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Shared handle to the current settings with an explicit reload entry point.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    source: Arc<SettingsSource>,
    current: Arc<RwLock<Arc<WhitelistSettings>>>,
}

impl SharedSettings {
    /// Resolve the settings from `source`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the block cannot be read or is invalid.
    pub async fn load(source: SettingsSource) -> AppResult<Self> {
        let settings = source.resolve().await?;
        Ok(Self::new(source, settings))
    }

    /// Wrap already-resolved settings. `reload` still reads from `source`.
    pub fn new(source: SettingsSource, settings: WhitelistSettings) -> Self {
        Self {
            source: Arc::new(source),
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn source(&self) -> &SettingsSource {
        &self.source
    }

    /// Snapshot of the current settings.
    pub async fn current(&self) -> Arc<WhitelistSettings> {
        self.current.read().await.clone()
    }

    /// Discard the current settings and re-read the block.
    ///
    /// On failure the previous settings stay in effect.
    pub async fn reload(&self) -> AppResult<Arc<WhitelistSettings>> {
        match self.source.resolve().await {
            Ok(settings) => {
                let settings = Arc::new(settings);
                *self.current.write().await = settings.clone();
                metrics::record_settings_reload("success");
                info!(
                    allowed_hosts = ?settings.allowed_whitelisted_hosts(),
                    "Whitelist settings reloaded"
                );
                Ok(settings)
            }
            Err(e) => {
                metrics::record_settings_reload("failure");
                warn!(error = %e, "Settings reload failed, keeping previous settings");
                Err(e)
            }
        }
    }
}
