//! Runtime configuration
//!
//! Settings come from three layers, each overriding the one before:
//! 1. `settings.json` in the application data directory (optional)
//! 2. `MEDIA_WAREHOUSE_*` environment variables
//! 3. Command line flags (applied by the binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hash::DEFAULT_BLOCK_SIZE;

pub const ENV_CATALOG: &str = "MEDIA_WAREHOUSE_CATALOG";
pub const ENV_HASH_BLOCK: &str = "MEDIA_WAREHOUSE_HASH_BLOCK";
pub const ENV_LOG: &str = "MEDIA_WAREHOUSE_LOG";

const APP_DIR: &str = "media-warehouse";
const SETTINGS_FILE: &str = "settings.json";
const CATALOG_FILE: &str = "catalog.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog database file
    pub catalog: PathBuf,
    /// Bytes hashed between cancellation checks
    pub hash_block_size: usize,
    /// `tracing` filter directive, e.g. "info" or "media_warehouse=debug"
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: app_dir().join(CATALOG_FILE),
            hash_block_size: DEFAULT_BLOCK_SIZE,
            log: "info".to_string(),
        }
    }
}

impl Config {
    /// Load the settings file (if any) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = app_dir().join(SETTINGS_FILE);
        let mut config = if settings.is_file() {
            Self::from_file(&settings)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read settings from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from variables found by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(catalog) = lookup(ENV_CATALOG) {
            self.catalog = PathBuf::from(catalog);
        }

        if let Some(value) = lookup(ENV_HASH_BLOCK) {
            self.hash_block_size = match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_HASH_BLOCK,
                        value,
                    })
                }
            };
        }

        if let Some(log) = lookup(ENV_LOG) {
            self.log = log;
        }

        Ok(())
    }
}

/// Per-user application data directory:
/// - Linux: ~/.local/share/media-warehouse
/// - macOS: ~/Library/Application Support/media-warehouse
/// - Windows: %APPDATA%\media-warehouse
pub fn app_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_into_app_dir() {
        let config = Config::default();
        assert!(config.catalog.ends_with("media-warehouse/catalog.db"));
        assert_eq!(config.hash_block_size, 64 * 1024);
        assert_eq!(config.log, "info");
    }

    #[test]
    fn settings_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "catalog": "/data/media.db" }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.catalog, PathBuf::from("/data/media.db"));
        assert_eq!(config.hash_block_size, DEFAULT_BLOCK_SIZE);

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn environment_overrides_settings() {
        let env: HashMap<&str, &str> = [
            (ENV_CATALOG, "/tmp/other.db"),
            (ENV_HASH_BLOCK, "4096"),
            (ENV_LOG, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.catalog, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.hash_block_size, 4096);
        assert_eq!(config.log, "debug");
    }

    #[test]
    fn rejects_bad_block_size() {
        for bad in ["0", "-1", "lots"] {
            let mut config = Config::default();
            let result = config.apply_env(|key| (key == ENV_HASH_BLOCK).then(|| bad.to_string()));
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        }
    }
}
