//! Warden configuration file handling.
//!
//! Operator configuration is TOML, stored in the data directory by
//! default. It covers deployment concerns only: who the owner is, where
//! persistent state lives, the initial sentinel target, and logging.
//! Everything the engine learns at runtime (trust registry, manifests,
//! fingerprints) lives in its own JSON files next to the config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Warden operator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    pub community: CommunityConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Community-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Principal id of the community owner. Always trusted, never
    /// removable from the trust registry.
    pub owner: u64,

    /// Voice channel the sentinel protects, if any.
    pub sentinel_target: Option<u64>,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for trust registry, fingerprints, and manifests.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or env-filter directive string
    /// (e.g. "info" or "warn,warden::raid=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl WardenConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: WardenConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Write a default configuration for the given owner.
    pub fn create_default(path: &Path, owner: u64) -> Result<(), Box<dyn std::error::Error>> {
        let config = WardenConfig {
            community: CommunityConfig {
                owner,
                sentinel_target: None,
            },
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.save(path)
    }
}
