//! Collector configuration for interlog.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "INTERLOG_DB_PATH";
pub const ENV_SNAPSHOT_DIR: &str = "INTERLOG_SNAPSHOT_DIR";
pub const ENV_BUFFER_CAPACITY: &str = "INTERLOG_BUFFER_CAPACITY";
pub const ENV_OPEN_TTL_SECS: &str = "INTERLOG_OPEN_TTL_SECS";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for one interaction collector and its stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// SQLite database holding closed records.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Root directory for per-record JSON snapshots. `None` disables them.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    /// Maximum number of open interactions held in memory.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Open interactions older than this are evicted as stale.
    #[serde(default = "default_open_ttl_secs")]
    pub open_ttl_secs: u64,
    /// Outbox rows written per snapshot drain pass.
    #[serde(default = "default_snapshot_batch_size")]
    pub snapshot_batch_size: usize,
    /// Idle wake interval of the background snapshot worker.
    #[serde(default = "default_snapshot_poll_ms")]
    pub snapshot_poll_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/interactions.db")
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_open_ttl_secs() -> u64 {
    3600
}

fn default_snapshot_batch_size() -> usize {
    64
}

fn default_snapshot_poll_ms() -> u64 {
    1000
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            snapshot_dir: None,
            buffer_capacity: default_buffer_capacity(),
            open_ttl_secs: default_open_ttl_secs(),
            snapshot_batch_size: default_snapshot_batch_size(),
            snapshot_poll_ms: default_snapshot_poll_ms(),
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `INTERLOG_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_SNAPSHOT_DIR) {
            self.snapshot_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(raw) = lookup(ENV_BUFFER_CAPACITY) {
            self.buffer_capacity = parse_number(ENV_BUFFER_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_OPEN_TTL_SECS) {
            self.open_ttl_secs = parse_number(ENV_OPEN_TTL_SECS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be positive".into()));
        }
        if self.snapshot_batch_size == 0 {
            return Err(ConfigError::Invalid("snapshot_batch_size must be positive".into()));
        }
        Ok(())
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_open_ttl_secs(mut self, secs: u64) -> Self {
        self.open_ttl_secs = secs;
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} is not a valid number: {raw}")))
}
