//! Server Configuration
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults ([`Config::default`])
//! 2. an optional TOML file (`--config path`)
//! 3. command-line flags
//!
//! Every field is optional in the file:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 2000
//! strategy = "completion"
//! capacity = 10000
//! snapshot_path = "/var/lib/cachekv/data.txt"
//! load_snapshot = true
//! ```

use crate::commands::DEFAULT_BACKFILL_TTL;
use crate::connection::{
    DispatchStrategy, DispatcherSettings, DEFAULT_BACKLOG, DEFAULT_BUFFER_SIZE,
};
use crate::storage::DEFAULT_CAPACITY;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which backing store sits behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackingKind {
    /// No backing store; misses stay misses
    #[default]
    None,
    /// An in-process map
    Memory,
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub strategy: DispatchStrategy,
    /// Handler threads for the readiness strategy
    pub workers: usize,
    /// Per-connection read and write buffer, in bytes
    pub buffer_size: usize,
    /// Maximum number of cached keys
    pub capacity: usize,
    pub sweep_interval_secs: u64,
    pub persist_interval_secs: u64,
    pub snapshot_path: PathBuf,
    /// Restore the snapshot file at startup
    pub load_snapshot: bool,
    /// TTL for values copied in from the backing store
    pub backfill_ttl_secs: u64,
    pub backing: BackingKind,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            strategy: DispatchStrategy::Readiness,
            workers: 4,
            buffer_size: DEFAULT_BUFFER_SIZE,
            capacity: DEFAULT_CAPACITY,
            sweep_interval_secs: 60,
            persist_interval_secs: 60,
            snapshot_path: PathBuf::from("kv_store_data.txt"),
            load_snapshot: false,
            backfill_ttl_secs: DEFAULT_BACKFILL_TTL.as_secs(),
            backing: BackingKind::None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads a TOML file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be at least 1".into(),
            ));
        }
        if self.persist_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "persist_interval_secs must be at least 1".into(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".into()));
        }
        Ok(())
    }

    /// Resolves `host:port` to the first matching socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                ConfigError::Invalid(format!("cannot resolve host '{}': {}", self.host, e))
            })?;
        addrs
            .next()
            .ok_or_else(|| ConfigError::Invalid(format!("host '{}' has no address", self.host)))
    }

    pub fn dispatcher_settings(&self) -> Result<DispatcherSettings, ConfigError> {
        Ok(DispatcherSettings {
            addr: self.bind_addr()?,
            strategy: self.strategy,
            backlog: self.backlog,
            buffer_size: self.buffer_size,
            workers: self.workers,
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    pub fn backfill_ttl(&self) -> Duration {
        Duration::from_secs(self.backfill_ttl_secs)
    }
}
