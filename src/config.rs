//! Configuration management for salonbook.
//!
//! Configuration is loaded with figment from TOML config files, environment
//! variables, and built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "salonbook";

/// Default store file name.
const STORE_FILE_NAME: &str = "records.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SALONBOOK_`)
/// 2. TOML config file at `~/.config/salonbook/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store configuration.
    pub store: StoreConfig,
    /// Backup configuration.
    pub backup: BackupConfig,
}

/// Key-value store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the store file.
    /// Defaults to `~/.local/share/salonbook/records.db`
    pub store_path: Option<PathBuf>,
    /// Storage quota in bytes across all persisted values.
    /// Set to 0 for unlimited. Defaults to 5 MiB, matching the ceiling
    /// browsers impose on local storage.
    pub quota_bytes: u64,
}

/// Backup (snapshot) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Maximum number of snapshot generations to retain.
    pub max_generations: usize,
    /// Interval between automatic snapshots in seconds.
    pub interval_secs: u64,
    /// Debounce window for data-change snapshots in milliseconds.
    /// Rapid repeated mutations within this window coalesce into one snapshot.
    pub debounce_ms: u64,
    /// Whether data mutations schedule a debounced snapshot.
    pub backup_on_change: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_path: None, // Resolved to the default data dir at runtime
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_generations: 30,
            interval_secs: 5 * 60,
            debounce_ms: 1000,
            backup_on_change: true,
        }
    }
}

impl BackupConfig {
    /// Get the automatic snapshot interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Get the debounce window as a Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("SALONBOOK_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.backup.max_generations == 0 {
            return Err(Error::ConfigValidation {
                message: "max_generations must be greater than 0".to_string(),
            });
        }

        if self.backup.interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "interval_secs must be greater than 0".to_string(),
            });
        }

        if self.backup.debounce_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "debounce_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the store path, resolving defaults if not set.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store
            .store_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(STORE_FILE_NAME))
    }

    /// Get the storage quota, or `None` when unlimited.
    #[must_use]
    pub fn quota(&self) -> Option<u64> {
        if self.store.quota_bytes == 0 {
            None
        } else {
            Some(self.store.quota_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.backup.max_generations, 30);
        assert_eq!(config.backup.interval_secs, 300);
        assert_eq!(config.backup.debounce_ms, 1000);
        assert!(config.backup.backup_on_change);
        assert_eq!(config.store.quota_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_generations() {
        let mut config = Config::default();
        config.backup.max_generations = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_generations"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.backup.interval_secs = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("interval_secs"));
    }

    #[test]
    fn test_validate_zero_debounce() {
        let mut config = Config::default();
        config.backup.debounce_ms = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_backup_durations() {
        let config = Config::default();
        assert_eq!(config.backup.interval(), Duration::from_secs(300));
        assert_eq!(config.backup.debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn test_store_path_default() {
        let config = Config::default();
        assert!(config
            .store_path()
            .to_string_lossy()
            .contains("records.db"));
    }

    #[test]
    fn test_store_path_custom() {
        let mut config = Config::default();
        config.store.store_path = Some(PathBuf::from("/custom/path/records.db"));

        assert_eq!(
            config.store_path(),
            PathBuf::from("/custom/path/records.db")
        );
    }

    #[test]
    fn test_quota_none_when_zero() {
        let mut config = Config::default();
        config.store.quota_bytes = 0;
        assert!(config.quota().is_none());
    }

    #[test]
    fn test_quota_some_when_set() {
        let config = Config::default();
        assert_eq!(config.quota(), Some(5 * 1024 * 1024));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("salonbook"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_backup_config_deserialize() {
        let json = r#"{"max_generations": 10, "interval_secs": 60}"#;
        let backup: BackupConfig = serde_json::from_str(json).unwrap();
        assert_eq!(backup.max_generations, 10);
        assert_eq!(backup.interval_secs, 60);
        // Unspecified fields fall back to defaults
        assert_eq!(backup.debounce_ms, 1000);
    }

    #[test]
    fn test_store_config_serialize() {
        let store = StoreConfig::default();
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.contains("quota_bytes"));
    }
}
