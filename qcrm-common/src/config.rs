//! Configuration loading
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `QCRM_CONFIG` environment variable
//! 3. `config.toml` in the platform config directory (`~/.config/qcrm` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable file is logged and replaced by defaults; only a
//! file that exists but fails to parse or validate is an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "QCRM_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub storage: StorageRetryConfig,
    pub transcription: TranscriptionConfig,
    pub booking: BookingConfig,
    pub bootstrap: BootstrapConfig,
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Retry policy for transient storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for StorageRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Transcription endpoint; transcription is disabled when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Calendar page that qualified leads are redirected to
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Qualification sessions untouched for this long are discarded
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Admin profile created on first start when no profiles exist
    pub admin_email: Option<String>,
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            return Err(Error::Config("server.bind_address must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config("database.max_connections must be at least 1".to_string()));
        }
        if self.storage.max_attempts == 0 {
            return Err(Error::Config("storage.max_attempts must be at least 1".to_string()));
        }
        if self.sessions.idle_timeout_secs == 0 {
            return Err(Error::Config("sessions.idle_timeout_secs must be at least 1".to_string()));
        }
        if let Some(endpoint) = &self.transcription.endpoint {
            reqwest::Url::parse(endpoint).map_err(|e| {
                Error::Config(format!("transcription.endpoint is not a URL: {}", e))
            })?;
        }
        if let Some(base) = &self.booking.base_url {
            reqwest::Url::parse(base)
                .map_err(|e| Error::Config(format!("booking.base_url is not a URL: {}", e)))?;
        }
        Ok(())
    }
}

/// Locate the config file by priority order
///
/// Returns `None` when neither an explicit path nor the platform file exists.
pub fn resolve_config_path(cli_arg: Option<&str>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("qcrm").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration, falling back to compiled defaults
pub fn load_config(cli_arg: Option<&str>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => load_config_file(&path),
        None => {
            info!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Load a specific config file; a missing file yields defaults with a warning
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let config = TomlConfig::from_toml_str(&text)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!(
                "Could not read config file {} ({}), using compiled defaults",
                path.display(),
                e
            );
            Ok(TomlConfig::default())
        }
    }
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qcrm"))
        .unwrap_or_else(|| PathBuf::from("./qcrm_data"))
        .join("qcrm.db")
}
