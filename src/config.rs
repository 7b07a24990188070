//! Configuration loading and management
//!
//! Handles parsing of `.questlog.toml` in the data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = ".questlog.toml";

/// Environment variable overriding the remote base URL
pub const ENV_REMOTE_URL: &str = "QUESTLOG_REMOTE_URL";

/// Environment variable overriding the remote API key
pub const ENV_REMOTE_KEY: &str = "QUESTLOG_REMOTE_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which persistence backend to use
    #[serde(default)]
    pub backend: BackendConfig,

    /// Local key-value backend settings
    #[serde(default)]
    pub local: LocalConfig,

    /// Remote record service settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Session persistence
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
}

/// Local backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Fixed storage key; the collection lives in `<key>.json`
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// How long to wait for the store lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_storage_key() -> String {
    "questlog_tasks".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Remote record service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// REST root, e.g. `https://project.supabase.co/rest/v1`
    #[serde(default)]
    pub url: String,

    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Table holding task records
    #[serde(default = "default_table")]
    pub table: String,

    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_table() -> String {
    "tasks".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            table: default_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session file, relative to the data directory
    #[serde(default = "default_session_file")]
    pub file: String,
}

fn default_session_file() -> String {
    "session.json".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::parse(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.questlog.toml` from the data directory, or defaults when absent
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::parse(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the local collection file for a data directory
    pub fn local_store_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.json", self.local.storage_key.trim()))
    }

    /// Path of the session file for a data directory
    pub fn session_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.session.file.trim())
    }

    fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self) {
        if let Some(url) = non_empty_env(ENV_REMOTE_URL) {
            self.remote.url = url;
        }
        if let Some(key) = non_empty_env(ENV_REMOTE_KEY) {
            self.remote.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.local.storage_key.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "local.storage_key cannot be empty".to_string(),
            ));
        }
        if self.session.file.trim().is_empty() {
            return Err(Error::InvalidConfig("session.file cannot be empty".to_string()));
        }
        if self.remote.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "remote.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.backend.kind == BackendKind::Remote && self.remote.url.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "remote backend selected but remote.url is empty".to_string(),
            ));
        }
        if self.remote.table.trim().is_empty() {
            return Err(Error::InvalidConfig("remote.table cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Default data directory (platform data dir, or `./.questlog` as a fallback)
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "questlog")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".questlog"))
}
