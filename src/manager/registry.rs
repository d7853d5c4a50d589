//! Disk registry
//!
//! Records a datanode's disk and carves its capacity into fixed-size blocks.
//! The disk row, every new block row and the advanced id counter land in one
//! batch, so a failed registration leaves neither a disk without blocks nor
//! blocks without a disk.

use crate::common::{timestamp_now, Deadline, Error, Result};
use crate::manager::metadata::{
    BlockRange, BlockRecord, Counter, DiskRecord, DiskStatus, MetaBatch, MetadataStore,
};
use crate::manager::pool::PoolLock;
use std::net::SocketAddr;
use std::sync::Arc;

/// A datanode's registration request, already validated at the edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRegistration {
    pub host: SocketAddr,
    pub mount_path: String,
    pub capacity: u64,
}

pub struct Registry {
    metadata: Arc<MetadataStore>,
    pool: Arc<PoolLock>,
    block_size: u64,
    max_blocks: u64,
}

impl Registry {
    pub fn new(
        metadata: Arc<MetadataStore>,
        pool: Arc<PoolLock>,
        block_size: u64,
        max_blocks: u64,
    ) -> Self {
        Self {
            metadata,
            pool,
            block_size,
            max_blocks,
        }
    }

    /// Register a disk and create its blocks.
    ///
    /// Returns the contiguous range of new block ids, or `None` when the
    /// capacity is smaller than one block.
    pub async fn register_disk(
        &self,
        req: DiskRegistration,
        deadline: Deadline,
    ) -> Result<Option<BlockRange>> {
        if req.mount_path.trim().is_empty() {
            return Err(Error::Validation("mount path cannot be empty".into()));
        }

        let block_count = req.capacity / self.block_size;
        if block_count > self.max_blocks {
            return Err(Error::Validation(format!(
                "capacity {} is {} blocks, limit is {} per disk",
                req.capacity, block_count, self.max_blocks
            )));
        }
        let unaddressable = req.capacity % self.block_size;
        if unaddressable > 0 {
            tracing::warn!(
                "Disk {}:{} capacity {} is not a multiple of block size {}, {} units unaddressable",
                req.host,
                req.mount_path,
                req.capacity,
                self.block_size,
                unaddressable
            );
        }

        let _guard = self.pool.acquire(&deadline).await?;

        if self.metadata.get_disk(&req.host, &req.mount_path)?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "disk {}:{}",
                req.host, req.mount_path
            )));
        }

        let first = self.metadata.next_id(Counter::BlockId)?;
        let range = match block_count {
            0 => None,
            n => {
                let last = first
                    .checked_add(n - 1)
                    .filter(|last| *last < u64::MAX)
                    .ok_or_else(|| {
                        Error::Validation(format!("block id space exhausted at {}", first))
                    })?;
                Some(BlockRange { first, last })
            }
        };

        let mut batch = MetaBatch::new();
        batch.put_disk(&DiskRecord {
            host: req.host,
            mount_path: req.mount_path.clone(),
            total: req.capacity,
            used: 0,
            free: req.capacity,
            status: DiskStatus::Healthy,
            blocks: range,
            unaddressable,
            registered_at: timestamp_now(),
            last_heartbeat: None,
        })?;
        if let Some(range) = range {
            for block_id in range.ids() {
                if block_id % 4096 == 0 {
                    deadline.check("registering disk")?;
                }
                batch.put_block(&BlockRecord {
                    block_id,
                    host: req.host,
                    allocated: false,
                    disabled: false,
                })?;
            }
            batch.set_counter(Counter::BlockId, range.last + 1);
        }

        deadline.check("registering disk")?;
        self.metadata.commit(batch)?;

        match range {
            Some(range) => tracing::info!(
                "Registered disk {}:{} with blocks {}..={}",
                req.host,
                req.mount_path,
                range.first,
                range.last
            ),
            None => tracing::info!(
                "Registered disk {}:{} without blocks (capacity {})",
                req.host,
                req.mount_path,
                req.capacity
            ),
        }

        Ok(range)
    }
}
