//! Common utilities and types shared across volmgr

pub mod config;
pub mod error;
pub mod storage;
pub mod utils;

pub use config::{Config, ManagerConfig, SpreadPolicy, StoreBackend};
pub use error::{Error, Result, Status};
pub use storage::{Batch, MemStore, MetaStore, RocksStore, Table};
pub use utils::{groups_for_quota, non_negative, timestamp_now, validate_name, Deadline};
