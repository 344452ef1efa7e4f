//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Override for the data directory (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Remote synchronization settings
    pub sync: SyncSettings,
}

/// Remote mirror settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Whether sync is enabled at all
    pub enabled: bool,
    /// Base URL of the remote mirror service
    pub endpoint: String,
    /// Authenticated (premium) account id; sync stays local without one
    pub user_id: Option<Uuid>,
    /// Bearer token for the remote mirror
    pub token: Option<String>,
    /// Periodic sync interval in seconds
    pub interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.rusthabit.io".to_string(),
            user_id: None,
            token: None,
            interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default platform location.
    ///
    /// A missing or malformed file yields the default configuration; the
    /// problem is logged, never fatal.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            tracing::warn!("No config directory available, using default config");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Default config file path for this platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "rusthabit", "RustHabit")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Where the local store lives.
    pub fn database_path(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.join("rusthabit.db");
        }

        directories::ProjectDirs::from("com", "rusthabit", "RustHabit")
            .map(|dirs| dirs.data_dir().join("rusthabit.db"))
            .unwrap_or_else(|| PathBuf::from("rusthabit.db"))
    }

    /// Whether this install is authenticated for remote sync.
    pub fn sync_authenticated(&self) -> bool {
        self.sync.enabled && self.sync.user_id.is_some() && self.sync.token.is_some()
    }
}

/// Configuration load errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config {0}: {1}")]
    Io(PathBuf, String),

    #[error("Failed to parse config {0}: {1}")]
    Parse(PathBuf, String),
}
