//! Volume catalog
//!
//! Resolves a volume into its block-group topology. Hosts are read from the
//! block rows at query time, so the answer always reflects the registry as
//! it is now, not as it was when the blocks were allocated.

use crate::common::{Deadline, Error, Result};
use crate::manager::metadata::{BlockId, GroupId, MetadataStore, VolumeRecord};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Where one replica lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub block_id: BlockId,
    pub host: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTopology {
    pub group_id: GroupId,
    pub blocks: Vec<BlockLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTopology {
    pub uuid: Uuid,
    pub name: String,
    pub quota: u64,
    /// Creation order
    pub groups: Vec<GroupTopology>,
}

pub struct Catalog {
    metadata: Arc<MetadataStore>,
}

impl Catalog {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Resolve a volume; any failed lookup fails the whole call
    pub fn get_volume_info(&self, uuid: &Uuid, deadline: &Deadline) -> Result<VolumeTopology> {
        deadline.check("looking up volume")?;
        let volume = self
            .metadata
            .get_volume(uuid)?
            .ok_or_else(|| Error::NotFound(format!("volume {}", uuid)))?;

        let records = self.metadata.groups_for_volume(uuid)?;
        let mut groups = Vec::with_capacity(records.len());
        for group in records {
            deadline.check("resolving volume topology")?;
            let blocks = group
                .block_ids
                .iter()
                .map(|id| self.locate(*id, uuid))
                .collect::<Result<Vec<_>>>()?;
            groups.push(GroupTopology {
                group_id: group.group_id,
                blocks,
            });
        }

        tracing::debug!(
            "Resolved volume {} ({}) into {} groups",
            volume.name,
            uuid,
            groups.len()
        );

        Ok(VolumeTopology {
            uuid: volume.uuid,
            name: volume.name,
            quota: volume.quota,
            groups,
        })
    }

    fn locate(&self, block_id: BlockId, volume: &Uuid) -> Result<BlockLocation> {
        let block = self.metadata.get_block(block_id)?.ok_or_else(|| {
            Error::MetadataCorrupted(format!(
                "block {} of volume {} has no registry row",
                block_id, volume
            ))
        })?;
        Ok(BlockLocation {
            block_id,
            host: block.host,
        })
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        self.metadata.list_volumes()
    }
}
