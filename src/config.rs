//! Process configuration.
//!
//! Settings come either from `MV_*` environment variables or from a TOML
//! file. Nothing here is global: callers load a [`Settings`] once at startup
//! and hand the pieces to the components that need them.
//!
//! Environment variables:
//! - `MV_DATA_DIRS`: colon-separated local data directories
//! - `MV_CLUSTER_PEERS`: comma-separated peer store addresses (`host:port`)
//! - `MV_CACHE_HOSTS`: comma-separated cache daemons (`server:port[:instance]`)
//! - `MV_CACHE_TIMEOUT_MS` / `MV_REMOTE_TIMEOUT_MS`: socket timeouts
//! - `MV_WIDE_PREFIX`: optional row-key prefix for the wide-column store
//! - `MV_WIDE_MIN_INTERVAL_SECS` / `MV_WIDE_COLUMN_INTERVAL_SECS`: scan
//!   version sizing

use crate::cache::CacheHost;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_dirs: Vec<PathBuf>,
    pub cluster_peers: Vec<String>,
    /// Cache daemon endpoints as `server:port[:instance]` strings; parse
    /// with [`Settings::cache_hosts`].
    pub cache_hosts: Vec<String>,
    pub cache_timeout_ms: u64,
    pub remote_timeout_ms: u64,
    pub wide_prefix: Option<String>,
    pub wide_min_interval_secs: u32,
    pub wide_column_interval_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dirs: Vec::new(),
            cluster_peers: Vec::new(),
            cache_hosts: Vec::new(),
            cache_timeout_ms: 1_000,
            remote_timeout_ms: 3_000,
            wide_prefix: None,
            wide_min_interval_secs: 10,
            wide_column_interval_secs: 3_600,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::InvalidHost(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl Settings {
    /// Load from environment variables, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            data_dirs: list_var("MV_DATA_DIRS", ':')
                .map(|dirs| dirs.into_iter().map(PathBuf::from).collect())
                .unwrap_or(defaults.data_dirs),
            cluster_peers: list_var("MV_CLUSTER_PEERS", ',').unwrap_or(defaults.cluster_peers),
            cache_hosts: list_var("MV_CACHE_HOSTS", ',').unwrap_or(defaults.cache_hosts),
            cache_timeout_ms: parsed_var("MV_CACHE_TIMEOUT_MS").unwrap_or(defaults.cache_timeout_ms),
            remote_timeout_ms: parsed_var("MV_REMOTE_TIMEOUT_MS")
                .unwrap_or(defaults.remote_timeout_ms),
            wide_prefix: std::env::var("MV_WIDE_PREFIX").ok().filter(|p| !p.is_empty()),
            wide_min_interval_secs: parsed_var("MV_WIDE_MIN_INTERVAL_SECS")
                .unwrap_or(defaults.wide_min_interval_secs),
            wide_column_interval_secs: parsed_var("MV_WIDE_COLUMN_INTERVAL_SECS")
                .unwrap_or(defaults.wide_column_interval_secs),
        }
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(ConfigError::Parse)
    }

    /// Parse the configured cache endpoints.
    pub fn cache_hosts(&self) -> Result<Vec<CacheHost>, ConfigError> {
        self.cache_hosts
            .iter()
            .map(|raw| raw.parse::<CacheHost>().map_err(ConfigError::InvalidHost))
            .collect()
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

fn list_var(name: &str, separator: char) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    Some(
        raw.split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}
