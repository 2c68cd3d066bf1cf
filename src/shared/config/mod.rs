//! Sync configuration module
//!
//! Provides the initialization options of the sync subsystem: cache lifetime,
//! connectivity debounce window, sweep interval and durable storage location.
//!
//! Values come from defaults, a TOML file, the builder, and finally
//! environment overrides (`PATTERN_SYNC_*`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default durable cache lifetime (24 hours)
pub const DEFAULT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Default connectivity flap suppression window
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Default interval of the periodic purge sweep (10 minutes)
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10 * 60 * 1000;

const ENV_MAX_AGE_MS: &str = "PATTERN_SYNC_MAX_AGE_MS";
const ENV_DEBOUNCE_MS: &str = "PATTERN_SYNC_DEBOUNCE_MS";
const ENV_DB_PATH: &str = "PATTERN_SYNC_DB_PATH";
const ENV_PERSIST: &str = "PATTERN_SYNC_PERSIST";

/// Sync subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cache lifetime in milliseconds
    pub max_age_ms: u64,
    /// Connectivity flap suppression window in milliseconds
    pub debounce_ms: u64,
    /// Interval between purge sweeps in milliseconds (0 disables the sweeper)
    pub sweep_interval_ms: u64,
    /// Location of the SQLite cache file
    pub database_path: Option<PathBuf>,
    /// Whether the durable store is used at all
    pub persist: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            database_path: None,
            persist: true,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `PATTERN_SYNC_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var(ENV_MAX_AGE_MS) {
            self.max_age_ms = parse_env_u64("max_age_ms", &value)?;
        }
        if let Ok(value) = std::env::var(ENV_DEBOUNCE_MS) {
            self.debounce_ms = parse_env_u64("debounce_ms", &value)?;
        }
        if let Ok(value) = std::env::var(ENV_DB_PATH) {
            if !value.is_empty() {
                self.database_path = Some(PathBuf::from(value));
            }
        }
        if let Ok(value) = std::env::var(ENV_PERSIST) {
            self.persist = !matches!(value.as_str(), "0" | "false" | "off");
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_age_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "debounce_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Cache lifetime
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Connectivity debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Sweep interval, `None` when the sweeper is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }

    /// Resolved SQLite path
    ///
    /// Falls back to the platform data directory, or the temp directory when
    /// the platform has none.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("pattern-sync");
        path.push("cache.db");
        path
    }
}

fn parse_env_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        field,
        reason: format!("{value:?} is not a number: {e}"),
    })
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    max_age: Option<Duration>,
    debounce: Option<Duration>,
    sweep_interval: Option<Duration>,
    database_path: Option<PathBuf>,
    persist: Option<bool>,
}

impl SyncConfigBuilder {
    /// Set the cache lifetime
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Set the connectivity debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// Set the sweep interval (`Duration::ZERO` disables the sweeper)
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the SQLite file location
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Enable or disable the durable store
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let defaults = SyncConfig::default();
        let config = SyncConfig {
            max_age_ms: self
                .max_age
                .map_or(defaults.max_age_ms, |d| d.as_millis() as u64),
            debounce_ms: self
                .debounce
                .map_or(defaults.debounce_ms, |d| d.as_millis() as u64),
            sweep_interval_ms: self
                .sweep_interval
                .map_or(defaults.sweep_interval_ms, |d| d.as_millis() as u64),
            database_path: self.database_path,
            persist: self.persist.unwrap_or(defaults.persist),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
