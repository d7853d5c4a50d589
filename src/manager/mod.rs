//! Volume manager
//!
//! The manager owns all cluster metadata:
//! - Disk registry (datanode disks → contiguous block ranges)
//! - Health tracking (heartbeats, fault disablement)
//! - Volume allocation (block groups spread over distinct hosts)
//! - Volume catalog (volume → group → block → host topology)

pub mod allocator;
pub mod catalog;
pub mod health;
pub mod http;
pub mod metadata;
pub mod placement;
pub mod pool;
pub mod registry;
pub mod server;
pub mod service;

pub use server::ManagerServer;
pub use service::VolumeManager;
