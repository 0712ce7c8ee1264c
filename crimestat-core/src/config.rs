//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/crimestat/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/crimestat/` (~/.config/crimestat/)
//! - Data: `$XDG_DATA_HOME/crimestat/` (~/.local/share/crimestat/)
//! - State/Logs: `$XDG_STATE_HOME/crimestat/` (~/.local/state/crimestat/)

use crate::error::{Error, Result};
use crate::metrics::thresholds::Thresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Store location and connection limits
    #[serde(default)]
    pub storage: StorageConfig,

    /// Classification thresholds for metrics and recommendations
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Transport-security service settings
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Override for the database file (defaults to the XDG data dir)
    pub database_path: Option<PathBuf>,

    /// Wall-clock bound for a single query, in milliseconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,

    /// How long SQLite waits on a locked database before reporting BUSY
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Retry attempts for transient BUSY/LOCKED failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries, in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            query_timeout_ms: default_query_timeout(),
            busy_timeout_ms: default_busy_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl StorageConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_ms == 0 {
            return Err(Error::Config(
                "storage.query_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_retries > 10 {
            return Err(Error::Config(
                "storage.max_retries must be at most 10".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_query_timeout() -> u64 {
    10_000
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    50
}

/// Transport-security configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Crime categories relevant to a journey between two departments
    #[serde(default = "default_transport_categories")]
    pub categories: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            categories: default_transport_categories(),
        }
    }
}

fn default_transport_categories() -> Vec<String> {
    [
        "Vols avec armes",
        "Vols violents sans arme",
        "Vols dans les véhicules",
        "Vols de véhicules",
        "Vols d'accessoires sur véhicules",
        "Destructions et dégradations volontaires",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency of every section.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.thresholds.validate()?;
        if self.transport.categories.is_empty() {
            return Err(Error::Config(
                "transport.categories must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/crimestat/config.toml` (~/.config/crimestat/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("crimestat").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/crimestat/` (~/.local/share/crimestat/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("crimestat")
    }

    /// Returns the state directory path (for logs and lock files)
    ///
    /// `$XDG_STATE_HOME/crimestat/` (~/.local/state/crimestat/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("crimestat")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/crimestat/crimestat.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("crimestat.db")
    }

    /// Database path in force: the `[storage]` override or the XDG default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/crimestat/crimestat.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("crimestat.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
