//! Single-writer discipline for the shared block pool
//!
//! Registration, heartbeat disable/re-enable and allocation all hold the
//! [`PoolLock`] from their first read of block state until their batch is
//! committed. Topology reads never take it.

use crate::common::{Deadline, Error, Result};
use crate::manager::metadata::BlockRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct PoolLock {
    inner: Mutex<()>,
}

/// Proof that the caller is the pool's only writer
pub type PoolGuard<'a> = MutexGuard<'a, ()>;

impl PoolLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access, giving up when `deadline` expires
    pub async fn acquire(&self, deadline: &Deadline) -> Result<PoolGuard<'_>> {
        match deadline.instant() {
            Some(at) => tokio::time::timeout_at(at, self.inner.lock())
                .await
                .map_err(|_| Error::Timeout("waiting for block pool lock".into())),
            None => Ok(self.inner.lock().await),
        }
    }
}

/// Block pool counters for the admin status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub allocated_blocks: u64,
    pub disabled_blocks: u64,
}

impl PoolStats {
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a BlockRecord>) -> Self {
        let mut stats = Self::default();
        for block in blocks {
            stats.total_blocks += 1;
            if block.allocated {
                stats.allocated_blocks += 1;
            }
            if block.disabled {
                stats.disabled_blocks += 1;
            }
            if block.is_eligible() {
                stats.free_blocks += 1;
            }
        }
        stats
    }
}
