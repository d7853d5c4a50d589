//! Configuration for volmgr components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `VOLMGR__MANAGER__BLOCK_SIZE=20`
pub const ENV_PREFIX: &str = "VOLMGR";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Volume manager config
    #[serde(default)]
    pub manager: ManagerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            manager: ManagerConfig::default(),
        }
    }
}

/// Which metadata backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rocksdb,
    Memory,
}

/// What to do when fewer than `replicas` distinct hosts have eligible blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadPolicy {
    /// Fail the group with `AllocationExhausted`
    Strict,
    /// Spread over as many hosts as possible, then reuse hosts
    BestEffort,
}

/// Volume manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Bind address for HTTP API
    pub bind_addr: SocketAddr,

    /// RocksDB path for metadata
    pub db_path: PathBuf,

    /// Metadata backend
    pub backend: StoreBackend,

    /// Capacity units per block
    pub block_size: u64,

    /// Blocks per block group
    pub replicas: usize,

    /// Fault-domain spread policy
    pub spread: SpreadPolicy,

    /// Clear `disabled` on a host's blocks when it reports healthy again
    pub reenable_on_recovery: bool,

    /// Largest number of blocks one disk registration may create
    pub max_blocks_per_disk: u64,

    /// Upper bound for one request
    pub request_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 10001)),
            db_path: PathBuf::from("./volmgr-data"),
            backend: StoreBackend::Rocksdb,
            block_size: 10,
            replicas: 3,
            spread: SpreadPolicy::BestEffort,
            reenable_on_recovery: false,
            max_blocks_per_disk: 1_000_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl ManagerConfig {
    /// In-memory config for tests and demos
    pub fn in_memory(block_size: u64, replicas: usize) -> Self {
        Self {
            backend: StoreBackend::Memory,
            block_size,
            replicas,
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size must be > 0".into()));
        }
        if self.replicas == 0 {
            return Err(Error::InvalidConfig("replicas must be > 0".into()));
        }
        if self.max_blocks_per_disk == 0 {
            return Err(Error::InvalidConfig("max_blocks_per_disk must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load from an optional TOML file, then `VOLMGR__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.manager.validate()?;
        Ok(config)
    }
}
