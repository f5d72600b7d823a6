//! # Sync Configuration
//!
//! Configuration management for the device sync core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PRIMESYNC_CONNECT_TIMEOUT_SECS=10                                  │
//! │     PRIMESYNC_DB_PATH=/var/lib/primesync/primesync.db                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/primesync/primesync.toml (Linux)                         │
//! │     ~/Library/Application Support/com.primesync.primesync/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     5 s timeout, single attempt, one device at a time                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # primesync.toml
//! [terminal]
//! connect_timeout_secs = 5
//! connect_retries = 0
//! default_port = 4370
//!
//! [fleet]
//! max_concurrent_devices = 1
//!
//! [database]
//! path = "/var/lib/primesync/primesync.db"
//! ```
//!
//! Application settings shown to operators (cloud URL, auto-sync toggles)
//! live in the local store instead; see [`crate::settings`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use primesync_core::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DEVICE_PORT};

use crate::error::{SyncError, SyncResult};

/// File name of the config file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "primesync.toml";

/// File name of the local store inside the platform data directory.
pub const DB_FILE_NAME: &str = "primesync.db";

// =============================================================================
// Terminal Settings
// =============================================================================

/// How the agent talks to a single terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// Bound on each connect attempt (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra connect attempts after the first one fails.
    /// 0 means a single attempt.
    #[serde(default)]
    pub connect_retries: u32,

    /// Initial backoff between connect attempts (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between connect attempts (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Port used when a device is registered without one.
    #[serde(default = "default_port")]
    pub default_port: u16,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    10
}
fn default_port() -> u16 {
    DEFAULT_DEVICE_PORT
}

impl Default for TerminalSettings {
    fn default() -> Self {
        TerminalSettings {
            connect_timeout_secs: default_connect_timeout(),
            connect_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            default_port: default_port(),
        }
    }
}

impl TerminalSettings {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Initial backoff as a `Duration`.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum backoff as a `Duration`.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Fleet Settings
// =============================================================================

/// How fleet operations walk the device list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSettings {
    /// Devices processed at the same time. 1 is strictly sequential.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_devices: usize,
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for FleetSettings {
    fn default() -> Self {
        FleetSettings {
            max_concurrent_devices: default_max_concurrent(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Where the local store lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Explicit database file. Falls back to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Terminal session settings.
    #[serde(default)]
    pub terminal: TerminalSettings,

    /// Fleet operation settings.
    #[serde(default)]
    pub fleet: FleetSettings,

    /// Local store settings.
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (primesync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.terminal.default_port == 0 {
            return Err(SyncError::InvalidConfig(
                "default_port must be greater than 0".into(),
            ));
        }

        if self.terminal.initial_backoff() > self.terminal.max_backoff() {
            return Err(SyncError::InvalidConfig(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_secs ({})",
                self.terminal.initial_backoff_ms, self.terminal.max_backoff_secs
            )));
        }

        if self.fleet.max_concurrent_devices == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrent_devices must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from a variable lookup (the process environment
    /// in [`SyncConfig::load`]). Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PRIMESYNC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("PRIMESYNC_CONNECT_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.terminal.connect_timeout_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid PRIMESYNC_CONNECT_TIMEOUT_SECS"),
            }
        }

        if let Some(value) = lookup("PRIMESYNC_CONNECT_RETRIES") {
            match value.parse() {
                Ok(retries) => self.terminal.connect_retries = retries,
                Err(_) => warn!(value = %value, "Ignoring invalid PRIMESYNC_CONNECT_RETRIES"),
            }
        }

        if let Some(value) = lookup("PRIMESYNC_MAX_CONCURRENT_DEVICES") {
            match value.parse() {
                Ok(n) => self.fleet.max_concurrent_devices = n,
                Err(_) => warn!(value = %value, "Ignoring invalid PRIMESYNC_MAX_CONCURRENT_DEVICES"),
            }
        }

        if let Some(value) = lookup("PRIMESYNC_DEFAULT_PORT") {
            match value.parse() {
                Ok(port) => self.terminal.default_port = port,
                Err(_) => warn!(value = %value, "Ignoring invalid PRIMESYNC_DEFAULT_PORT"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolved database path: explicit path, else the platform data dir,
    /// else the working directory.
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join(DB_FILE_NAME)))
            .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "primesync", "primesync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.terminal.connect_timeout_secs, 5);
        assert_eq!(config.terminal.connect_retries, 0);
        assert_eq!(config.terminal.default_port, 4370);
        assert_eq!(config.fleet.max_concurrent_devices, 1);
        assert!(config.database.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.terminal.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.terminal.connect_timeout_secs = 5;

        config.fleet.max_concurrent_devices = 0;
        assert!(config.validate().is_err());
        config.fleet.max_concurrent_devices = 4;
        assert!(config.validate().is_ok());

        config.terminal.initial_backoff_ms = 20_000;
        config.terminal.max_backoff_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PRIMESYNC_DB_PATH", "/tmp/ps.db"),
            ("PRIMESYNC_CONNECT_TIMEOUT_SECS", "9"),
            ("PRIMESYNC_CONNECT_RETRIES", "not-a-number"),
            ("PRIMESYNC_MAX_CONCURRENT_DEVICES", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.db_path(), PathBuf::from("/tmp/ps.db"));
        assert_eq!(config.terminal.connect_timeout_secs, 9);
        assert_eq!(config.terminal.connect_retries, 0);
        assert_eq!(config.fleet.max_concurrent_devices, 3);
        assert_eq!(config.terminal.default_port, 4370);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [terminal]
            connect_timeout_secs = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.terminal.connect_timeout_secs, 12);
        assert_eq!(config.terminal.default_port, 4370);
        assert_eq!(config.fleet.max_concurrent_devices, 1);
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("primesync-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE_NAME);

        let mut config = SyncConfig::default();
        config.terminal.connect_retries = 2;
        config.database.path = Some(PathBuf::from("/data/primesync.db"));
        config.save(Some(path.clone())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[terminal]"));
        assert!(text.contains("[fleet]"));

        let loaded: SyncConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded.terminal.connect_retries, 2);
        assert_eq!(loaded.db_path(), PathBuf::from("/data/primesync.db"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
