use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_API_BASE;
use crate::error::ErrorCode;

/// Hard default list used when neither the user nor the config names one.
pub const DEFAULT_LIST_ID: &str = "@default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl IdentityConfig {
    /// Client id and secret, both required for the refresh grant.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing value.
    pub fn client_credentials(&self) -> Result<(&str, &str)> {
        let id = non_empty(self.client_id.as_deref()).ok_or_else(|| missing("identity.client_id"))?;
        let secret = non_empty(self.client_secret.as_deref())
            .ok_or_else(|| missing("identity.client_secret"))?;
        Ok((id, secret))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub require_user_list: bool,
    #[serde(default)]
    pub validate_mappings: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            list_id: None,
            require_user_list: false,
            validate_mappings: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TargetConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured fallback list, else [`DEFAULT_LIST_ID`].
    #[must_use]
    pub fn fallback_list_id(&self) -> &str {
        non_empty(self.list_id.as_deref()).unwrap_or(DEFAULT_LIST_ID)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_tombstone_ttl_secs")]
    pub tombstone_ttl_secs: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            tombstone_ttl_secs: default_tombstone_ttl_secs(),
        }
    }
}

impl MappingConfig {
    #[must_use]
    pub const fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }
}

/// Where the config file is expected when `--config` is not given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskbridge/config.toml"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the user config directory is
/// consulted and defaults are used when no file is there. Environment
/// overrides are applied last, and a relative store path is resolved against
/// the config file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<BridgeConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.exists()),
    };

    let mut config = match &path {
        Some(path) => parse_config_file(path)?,
        None => BridgeConfig::default(),
    };

    apply_env_overrides(&mut config, |name| env::var(name).ok());

    if let Some(base) = path.as_deref().and_then(Path::parent)
        && config.store.path.is_relative()
    {
        config.store.path = base.join(&config.store.path);
    }

    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<BridgeConfig>(&content).with_context(|| {
        format!(
            "{}: Failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })
}

fn apply_env_overrides(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(value) = lookup("TASKBRIDGE_CLIENT_ID") {
        config.identity.client_id = Some(value);
    }
    if let Some(value) = lookup("TASKBRIDGE_CLIENT_SECRET") {
        config.identity.client_secret = Some(value);
    }
    if let Some(value) = lookup("TASKBRIDGE_LIST_ID") {
        config.target.list_id = Some(value);
    }
    if let Some(value) = lookup("TASKBRIDGE_STORE") {
        config.store.path = PathBuf::from(value);
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn missing(field: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "{}: {} is not set ({})",
        ErrorCode::ConfigMissingValue.code(),
        field,
        ErrorCode::ConfigMissingValue.hint().unwrap_or_default()
    )
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

const fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_store_path() -> PathBuf {
    PathBuf::from("taskbridge.sqlite3")
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_tombstone_ttl_secs() -> u64 {
    3600
}
