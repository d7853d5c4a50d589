//! Typed metadata tables over a [`MetaStore`] backend
//!
//! Stores:
//! - Disks (host/mount → capacity, utilisation, status, block range)
//! - Blocks (block id → owning host, allocated/disabled flags)
//! - Volumes (uuid → name, quota)
//! - Block groups (uuid ++ group id → ordered replica block ids)
//! - Id counters

use crate::common::{Batch, Error, ManagerConfig, MemStore, MetaStore, Result, RocksStore, StoreBackend, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use uuid::Uuid;

pub type BlockId = u64;
pub type GroupId = u64;

/// Health as reported by the datanode; any non-zero code is a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskStatus {
    Healthy,
    Faulty(u32),
}

impl DiskStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DiskStatus::Healthy,
            code => DiskStatus::Faulty(code),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            DiskStatus::Healthy => 0,
            DiskStatus::Faulty(code) => *code,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, DiskStatus::Healthy)
    }
}

impl std::fmt::Display for DiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskStatus::Healthy => write!(f, "healthy"),
            DiskStatus::Faulty(code) => write!(f, "faulty({})", code),
        }
    }
}

/// Contiguous, inclusive range of block ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub first: BlockId,
    pub last: BlockId,
}

impl BlockRange {
    pub fn ids(&self) -> RangeInclusive<BlockId> {
        self.first..=self.last
    }

    pub fn count(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn overlaps(&self, other: &BlockRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Registered physical disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub host: SocketAddr,
    pub mount_path: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub status: DiskStatus,
    /// `None` when the capacity was smaller than one block
    pub blocks: Option<BlockRange>,
    /// Capacity left over after carving whole blocks
    pub unaddressable: u64,
    pub registered_at: i64,
    pub last_heartbeat: Option<i64>,
}

/// Allocation granule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_id: BlockId,
    pub host: SocketAddr,
    pub allocated: bool,
    pub disabled: bool,
}

impl BlockRecord {
    /// Can this block be handed to a new group?
    pub fn is_eligible(&self) -> bool {
        !self.allocated && !self.disabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub uuid: Uuid,
    pub name: String,
    pub quota: u64,
    pub group_count: u64,
    pub created_at: i64,
}

/// One replica set; `block_ids` keeps allocation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGroupRecord {
    pub group_id: GroupId,
    pub volume: Uuid,
    pub block_ids: Vec<BlockId>,
}

/// Monotonic id sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    BlockId,
    GroupId,
}

impl Counter {
    fn key(&self) -> &'static [u8] {
        match self {
            Counter::BlockId => b"next_block_id",
            Counter::GroupId => b"next_group_id",
        }
    }
}

fn host_prefix(host: &SocketAddr) -> Vec<u8> {
    format!("{}/", host).into_bytes()
}

fn disk_key(host: &SocketAddr, mount_path: &str) -> Vec<u8> {
    format!("{}/{}", host, mount_path).into_bytes()
}

fn block_key(id: BlockId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn volume_key(uuid: &Uuid) -> Vec<u8> {
    uuid.as_bytes().to_vec()
}

// Group ids are monotonic, so the big-endian suffix keeps creation order
fn group_key(uuid: &Uuid, group_id: GroupId) -> Vec<u8> {
    let mut key = uuid.as_bytes().to_vec();
    key.extend_from_slice(&group_id.to_be_bytes());
    key
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    bincode::serialize(row).map_err(|e| Error::Internal(format!("Serialize error: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::MetadataCorrupted(e.to_string()))
}

/// Typed mutations committed as one atomic batch
#[derive(Debug, Default)]
pub struct MetaBatch {
    inner: Batch,
}

impl MetaBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_disk(&mut self, disk: &DiskRecord) -> Result<()> {
        self.inner
            .put(Table::Disks, disk_key(&disk.host, &disk.mount_path), encode(disk)?);
        Ok(())
    }

    pub fn put_block(&mut self, block: &BlockRecord) -> Result<()> {
        self.inner
            .put(Table::Blocks, block_key(block.block_id), encode(block)?);
        Ok(())
    }

    pub fn put_volume(&mut self, volume: &VolumeRecord) -> Result<()> {
        self.inner
            .put(Table::Volumes, volume_key(&volume.uuid), encode(volume)?);
        Ok(())
    }

    pub fn put_group(&mut self, group: &BlockGroupRecord) -> Result<()> {
        self.inner.put(
            Table::BlockGroups,
            group_key(&group.volume, group.group_id),
            encode(group)?,
        );
        Ok(())
    }

    /// Record the next unused value of a sequence
    pub fn set_counter(&mut self, counter: Counter, next: u64) {
        self.inner
            .put(Table::Counters, counter.key(), next.to_be_bytes().to_vec());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Metadata store
pub struct MetadataStore {
    backend: Arc<dyn MetaStore>,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn MetaStore>) -> Self {
        Self { backend }
    }

    /// Open the backend selected by `config`
    pub fn open(config: &ManagerConfig) -> Result<Self> {
        let backend: Arc<dyn MetaStore> = match config.backend {
            StoreBackend::Rocksdb => Arc::new(RocksStore::open(&config.db_path)?),
            StoreBackend::Memory => Arc::new(MemStore::new()),
        };
        Ok(Self::new(backend))
    }

    fn get_row<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> Result<Option<T>> {
        match self.backend.get(table, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_rows<T: DeserializeOwned>(&self, table: Table, prefix: &[u8]) -> Result<Vec<T>> {
        self.backend
            .scan_prefix(table, prefix)?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    // === Disk operations ===

    pub fn get_disk(&self, host: &SocketAddr, mount_path: &str) -> Result<Option<DiskRecord>> {
        self.get_row(Table::Disks, &disk_key(host, mount_path))
    }

    /// Every disk registered under `host`
    pub fn disks_for_host(&self, host: &SocketAddr) -> Result<Vec<DiskRecord>> {
        self.scan_rows(Table::Disks, &host_prefix(host))
    }

    pub fn list_disks(&self) -> Result<Vec<DiskRecord>> {
        self.scan_rows(Table::Disks, b"")
    }

    // === Block operations ===

    pub fn get_block(&self, id: BlockId) -> Result<Option<BlockRecord>> {
        self.get_row(Table::Blocks, &block_key(id))
    }

    /// All blocks, ordered by id
    pub fn list_blocks(&self) -> Result<Vec<BlockRecord>> {
        self.scan_rows(Table::Blocks, b"")
    }

    pub fn blocks_in_range(&self, range: BlockRange) -> Result<Vec<BlockRecord>> {
        range
            .ids()
            .map(|id| {
                self.get_block(id)?.ok_or_else(|| {
                    Error::MetadataCorrupted(format!("block {} missing from registered range", id))
                })
            })
            .collect()
    }

    // === Volume operations ===

    pub fn get_volume(&self, uuid: &Uuid) -> Result<Option<VolumeRecord>> {
        self.get_row(Table::Volumes, &volume_key(uuid))
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        self.scan_rows(Table::Volumes, b"")
    }

    /// A volume's groups in creation order
    pub fn groups_for_volume(&self, uuid: &Uuid) -> Result<Vec<BlockGroupRecord>> {
        self.scan_rows(Table::BlockGroups, uuid.as_bytes())
    }

    // === Counters ===

    /// Next unused id of a sequence; ids start at 1
    pub fn next_id(&self, counter: Counter) -> Result<u64> {
        match self.backend.get(Table::Counters, counter.key())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::MetadataCorrupted(format!("counter {:?} has {} bytes", counter, bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(1),
        }
    }

    /// Apply a batch atomically
    pub fn commit(&self, batch: MetaBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.backend.commit(batch.inner)
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}
