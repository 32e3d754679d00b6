//! Service configuration loading and TOML persistence.
//!
//! Provides TOML-based configuration for the findex daemon:
//! - General settings (data directory, worker counts, batching, debounce)
//! - Roots registered at startup
//! - Search result limits

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{FindexError, Result};

fn default_scan_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    1000
}

/// Debounce window for duplicate modify events, in milliseconds.
fn default_debounce_ms() -> u64 {
    100
}

fn default_count() -> usize {
    100
}

fn default_max_count() -> usize {
    10_000
}

/// Main configuration for the findex daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General service settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Search result limits.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from the standard config path.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| FindexError::InvalidInput(format!("failed to read config file: {e}")))?;

        toml::from_str(&contents)
            .map_err(|e| FindexError::InvalidInput(format!("failed to parse config file: {e}")))
    }

    /// Save configuration to the standard config path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| FindexError::InvalidInput(format!("failed to serialize config: {e}")))?;

        std::fs::write(&path, contents)?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Standard configuration file path under the platform config dir.
    pub fn config_path() -> PathBuf {
        match directories::ProjectDirs::from("", "", "findex") {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => PathBuf::from(".findex").join("config.toml"),
        }
    }

    /// Data directory for the index database and logs.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.general.data_dir {
            return dir.clone();
        }
        match directories::ProjectDirs::from("", "", "findex") {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => PathBuf::from(".findex"),
        }
    }

    /// Full path of the index database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("index.db")
    }
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory for the database and logs. Defaults to the
    /// platform data dir.
    pub data_dir: Option<PathBuf>,

    /// Number of parallel scan workers.
    #[serde(default = "default_scan_workers")]
    pub scan_workers: usize,

    /// Records per store transaction during bulk scans.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Coalescing window for duplicate modify events (milliseconds).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Roots registered when the daemon starts.
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    /// Extra ignore patterns merged into the persisted set at startup.
    #[serde(default)]
    pub extra_ignores: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            scan_workers: default_scan_workers(),
            batch_size: default_batch_size(),
            debounce_ms: default_debounce_ms(),
            watch_paths: Vec::new(),
            extra_ignores: Vec::new(),
        }
    }
}

/// Search result limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result count when the caller doesn't specify one.
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Hard cap on requested result counts.
    #[serde(default = "default_max_count")]
    pub max_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
        }
    }
}
