//! Configuration management for the dashboard filter engine
//!
//! TOML file support with environment variable overrides and sensible
//! defaults. Every section is optional in the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "OUVIDORIA_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ouvidoria.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Aggregation backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Loader timing and TTLs
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Aggregation cache bounds
    #[serde(default)]
    pub cache: CacheConfig,

    /// Page-local filter snapshots
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Extra UI → backend field mappings
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the API (no trailing slash)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Loader configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderConfig {
    /// Debounce window for bursts of loads on one endpoint
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// TTL for filtered results
    #[serde(default = "default_filtered_ttl_ms")]
    pub filtered_ttl_ms: u64,

    /// TTL for the unfiltered (full dataset) result
    #[serde(default = "default_full_dataset_ttl_ms")]
    pub full_dataset_ttl_ms: u64,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum entries per cache tier
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Enable caching
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Snapshot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotConfig {
    /// Enable page-local snapshots
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for snapshot files
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,

    /// Snapshots older than this are discarded on restore
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:3000/api".to_string() }
fn default_timeout_ms() -> u64 { 15_000 }
fn default_debounce_ms() -> u64 { 150 }
fn default_filtered_ttl_ms() -> u64 { 30_000 }
fn default_full_dataset_ttl_ms() -> u64 { 300_000 }
fn default_max_entries() -> usize { 1_000 }
fn default_snapshot_dir() -> PathBuf { PathBuf::from(".ouvidoria/filters") }
fn default_max_age_days() -> i64 { 7 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            filtered_ttl_ms: default_filtered_ttl_ms(),
            full_dataset_ttl_ms: default_full_dataset_ttl_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            enabled: true,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_snapshot_dir(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BackendConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LoaderConfig {
    /// Debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// TTL for filtered results
    pub fn filtered_ttl(&self) -> Duration {
        Duration::from_millis(self.filtered_ttl_ms)
    }

    /// TTL for the unfiltered result
    pub fn full_dataset_ttl(&self) -> Duration {
        Duration::from_millis(self.full_dataset_ttl_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load from a file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OUVIDORIA_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(raw) = std::env::var("OUVIDORIA_DEBOUNCE_MS") {
            if let Some(ms) = parse_env_value("OUVIDORIA_DEBOUNCE_MS", &raw) {
                self.loader.debounce_ms = ms;
            }
        }
        if let Ok(dir) = std::env::var("OUVIDORIA_SNAPSHOT_DIR") {
            self.snapshot.dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        if self.backend.timeout_ms == 0 {
            return Err(Error::Configuration("backend.timeout_ms must be > 0".to_string()));
        }
        if self.loader.debounce_ms > 5_000 {
            return Err(Error::Configuration(
                "loader.debounce_ms cannot exceed 5000".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(Error::Configuration(
                "cache.max_entries must be > 0 when the cache is enabled".to_string(),
            ));
        }
        if self.snapshot.max_age_days <= 0 {
            return Err(Error::Configuration(
                "snapshot.max_age_days must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Resolve configuration
///
/// Priority:
/// 1. explicit `path`
/// 2. `OUVIDORIA_CONFIG` environment variable
/// 3. `ouvidoria.toml` in the working directory
/// 4. defaults
///
/// Environment overrides are applied in every case.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file_with_env(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Config::from_file_with_env(path);
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Config::from_file_with_env(local);
    }

    Ok(Config::from_env())
}

/// Parse an environment override, logging and ignoring values that do not parse
fn parse_env_value<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = raw, "ignoring unparsable environment override");
            None
        },
    }
}
