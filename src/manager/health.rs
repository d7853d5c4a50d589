//! Datanode heartbeat processing
//!
//! Heartbeats refresh a host's utilisation and status. A faulty status
//! disables every block the host owns in the same batch as the status
//! update. Heartbeats are best effort: failures are logged, never returned.

use crate::common::{timestamp_now, Deadline, Error, Result};
use crate::manager::metadata::{DiskStatus, MetaBatch, MetadataStore};
use crate::manager::pool::PoolLock;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub host: SocketAddr,
    pub used: u64,
    pub free: u64,
    pub status: DiskStatus,
}

/// What one heartbeat changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    pub disks_updated: usize,
    pub blocks_disabled: usize,
    pub blocks_reenabled: usize,
}

pub struct HealthTracker {
    metadata: Arc<MetadataStore>,
    pool: Arc<PoolLock>,
    reenable_on_recovery: bool,
}

impl HealthTracker {
    pub fn new(metadata: Arc<MetadataStore>, pool: Arc<PoolLock>, reenable_on_recovery: bool) -> Self {
        Self {
            metadata,
            pool,
            reenable_on_recovery,
        }
    }

    /// Apply a heartbeat, swallowing any failure
    pub async fn report_heartbeat(&self, hb: Heartbeat, deadline: Deadline) {
        tracing::debug!(
            "Heartbeat from {} (used:{} free:{} status:{})",
            hb.host,
            hb.used,
            hb.free,
            hb.status
        );
        match self.apply_heartbeat(hb, deadline).await {
            Ok(_) => {}
            Err(Error::NotFound(what)) => {
                tracing::warn!("Heartbeat from unregistered {}", what);
            }
            Err(e) => {
                tracing::error!("Heartbeat from {} not applied: {}", hb.host, e);
            }
        }
    }

    /// Apply a heartbeat and report what changed.
    ///
    /// Runs under the pool lock, so heartbeats for one host apply in arrival
    /// order and a fault never interleaves with an in-flight allocation.
    pub async fn apply_heartbeat(&self, hb: Heartbeat, deadline: Deadline) -> Result<HeartbeatOutcome> {
        let _guard = self.pool.acquire(&deadline).await?;

        let disks = self.metadata.disks_for_host(&hb.host)?;
        if disks.is_empty() {
            return Err(Error::NotFound(format!("host {}", hb.host)));
        }

        let mut outcome = HeartbeatOutcome::default();
        let mut batch = MetaBatch::new();
        let now = timestamp_now();

        for mut disk in disks {
            disk.used = hb.used;
            disk.free = hb.free;
            disk.status = hb.status;
            disk.last_heartbeat = Some(now);
            batch.put_disk(&disk)?;
            outcome.disks_updated += 1;

            let Some(range) = disk.blocks else {
                continue;
            };
            let flip_to = match hb.status {
                DiskStatus::Faulty(_) => true,
                DiskStatus::Healthy if self.reenable_on_recovery => false,
                DiskStatus::Healthy => continue,
            };
            for mut block in self.metadata.blocks_in_range(range)? {
                if block.disabled == flip_to {
                    continue;
                }
                block.disabled = flip_to;
                batch.put_block(&block)?;
                if flip_to {
                    outcome.blocks_disabled += 1;
                } else {
                    outcome.blocks_reenabled += 1;
                }
            }
        }

        deadline.check("applying heartbeat")?;
        self.metadata.commit(batch)?;

        if outcome.blocks_disabled > 0 {
            tracing::info!(
                "Host {} reported status {}, disabled {} blocks",
                hb.host,
                hb.status,
                outcome.blocks_disabled
            );
        }
        if outcome.blocks_reenabled > 0 {
            tracing::info!(
                "Host {} recovered, re-enabled {} blocks",
                hb.host,
                outcome.blocks_reenabled
            );
        }

        Ok(outcome)
    }
}
