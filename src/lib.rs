//! # volmgr
//!
//! Metadata control plane for a distributed block-storage cluster:
//! - Disk registry carving datanode capacity into fixed-size blocks
//! - Heartbeat-driven health tracking with fault disablement
//! - Atomic volume allocation into replicated block groups
//! - Volume topology lookup (volume → group → block → host)
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────┐  register / heartbeat   ┌──────────────────────────┐
//! │  Datanodes   │ ──────────────────────▶ │      Volume manager      │
//! └──────────────┘                         │  Registry  HealthTracker │
//! ┌──────────────┐  create / info          │  Allocator     Catalog   │
//! │   Clients    │ ──────────────────────▶ │       (pool lock)        │
//! └──────────────┘                         └────────────┬─────────────┘
//!                                                       │ atomic batches
//!                                          ┌────────────▼─────────────┐
//!                                          │  RocksDB / in-memory     │
//!                                          │  disks blocks volumes    │
//!                                          │  block_groups counters   │
//!                                          └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the manager
//! ```bash
//! volmgr-server serve \
//!   --bind 0.0.0.0:10001 \
//!   --db ./volmgr-data \
//!   --block-size 10 \
//!   --replicas 3
//! ```
//!
//! ### Use the CLI
//! ```bash
//! volmgr register --host 10.0.0.1 --port 9000 --mount /data --capacity 100
//! volmgr heartbeat --host 10.0.0.1 --port 9000 --used 20 --free 80 --status 0
//! volmgr create v1 --quota 25
//! volmgr info 6f1c...
//! volmgr status
//! ```

pub mod api;
pub mod client;
pub mod common;
pub mod manager;

// Re-export commonly used types
pub use client::ManagerClient;
pub use common::{Config, Error, Result};
pub use manager::{ManagerServer, VolumeManager};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
