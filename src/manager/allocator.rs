//! Volume allocation
//!
//! A volume is created in one batch: the volume row, every block group and
//! every block's `allocated` flag commit together or not at all. The whole
//! plan is built from a read of the block pool taken under the pool lock, so
//! concurrent allocations and heartbeat faults are serialised against it and
//! a failure at any step leaves the pool exactly as it was.

use crate::common::{groups_for_quota, timestamp_now, validate_name, Deadline, Error, Result};
use crate::manager::metadata::{
    BlockGroupRecord, BlockId, BlockRecord, Counter, MetaBatch, MetadataStore, VolumeRecord,
};
use crate::manager::placement::{CandidatePool, PlacementManager};
use crate::manager::pool::PoolLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct Allocator {
    metadata: Arc<MetadataStore>,
    pool: Arc<PoolLock>,
    placement: PlacementManager,
    block_size: u64,
}

impl Allocator {
    pub fn new(
        metadata: Arc<MetadataStore>,
        pool: Arc<PoolLock>,
        placement: PlacementManager,
        block_size: u64,
    ) -> Self {
        Self {
            metadata,
            pool,
            placement,
            block_size,
        }
    }

    /// Create a volume of `quota` capacity units and allocate its groups
    pub async fn create_volume(&self, name: &str, quota: u64, deadline: Deadline) -> Result<Uuid> {
        validate_name(name)?;
        if quota == 0 {
            return Err(Error::Validation("quota must be > 0".into()));
        }

        let group_count = groups_for_quota(quota, self.block_size);
        let uuid = Uuid::new_v4();

        let _guard = self.pool.acquire(&deadline).await?;

        let blocks = self.metadata.list_blocks()?;
        let groups = self.plan_groups(&blocks, group_count, &deadline).inspect_err(|e| {
            tracing::warn!("Create volume({} -- {}) failed: {}", name, uuid, e);
        })?;

        let by_id: HashMap<BlockId, &BlockRecord> =
            blocks.iter().map(|b| (b.block_id, b)).collect();
        let first_group = self.metadata.next_id(Counter::GroupId)?;

        let mut batch = MetaBatch::new();
        batch.put_volume(&VolumeRecord {
            uuid,
            name: name.to_string(),
            quota,
            group_count,
            created_at: timestamp_now(),
        })?;

        for (group_id, block_ids) in (first_group..).zip(groups) {
            for id in &block_ids {
                let block = by_id
                    .get(id)
                    .ok_or_else(|| Error::Internal(format!("planned block {} not in pool", id)))?;
                batch.put_block(&BlockRecord {
                    allocated: true,
                    ..(*block).clone()
                })?;
            }
            tracing::debug!(
                "The volume({} -- {}) group {} has blocks {:?}",
                name,
                uuid,
                group_id,
                block_ids
            );
            batch.put_group(&BlockGroupRecord {
                group_id,
                volume: uuid,
                block_ids,
            })?;
        }
        batch.set_counter(Counter::GroupId, first_group + group_count);

        deadline.check("committing volume")?;
        if let Err(e) = self.metadata.commit(batch) {
            tracing::error!("Create volume({} -- {}) commit failed: {}", name, uuid, e);
            return Err(e);
        }

        tracing::info!(
            "Created volume {} ({}) quota {} with {} groups of {}",
            name,
            uuid,
            quota,
            group_count,
            self.placement.replicas()
        );
        Ok(uuid)
    }

    /// Pick the blocks of every group, in group order
    fn plan_groups(
        &self,
        blocks: &[BlockRecord],
        group_count: u64,
        deadline: &Deadline,
    ) -> Result<Vec<Vec<BlockId>>> {
        let mut candidates = CandidatePool::from_blocks(blocks);
        let mut rng = rand::thread_rng();
        let mut groups = Vec::new();

        for group in 0..group_count {
            deadline.check("planning block groups")?;
            let selected = self
                .placement
                .select_group(&mut candidates, &mut rng)
                .ok_or(Error::AllocationExhausted {
                    group,
                    needed: self.placement.replicas(),
                    available: candidates.len(),
                })?;
            groups.push(selected);
        }

        Ok(groups)
    }
}
