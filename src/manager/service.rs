//! The volume manager service object
//!
//! Owns the metadata store and the pool lock and hands both to the four
//! components. Construct with [`VolumeManager::open`], release with
//! [`VolumeManager::close`].

use crate::common::{Deadline, ManagerConfig, MetaStore, Result};
use crate::manager::allocator::Allocator;
use crate::manager::catalog::{Catalog, VolumeTopology};
use crate::manager::health::{HealthTracker, Heartbeat, HeartbeatOutcome};
use crate::manager::metadata::{BlockRange, DiskRecord, MetadataStore, VolumeRecord};
use crate::manager::placement::PlacementManager;
use crate::manager::pool::{PoolLock, PoolStats};
use crate::manager::registry::{DiskRegistration, Registry};
use std::sync::Arc;
use uuid::Uuid;

pub struct VolumeManager {
    config: ManagerConfig,
    metadata: Arc<MetadataStore>,
    registry: Registry,
    health: HealthTracker,
    allocator: Allocator,
    catalog: Catalog,
}

impl VolumeManager {
    /// Open the configured backend and build the components
    pub fn open(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let metadata = Arc::new(MetadataStore::open(&config)?);
        Ok(Self::build(config, metadata))
    }

    /// Build over an existing backend
    pub fn with_store(config: ManagerConfig, store: Arc<dyn MetaStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Arc::new(MetadataStore::new(store))))
    }

    fn build(config: ManagerConfig, metadata: Arc<MetadataStore>) -> Self {
        let pool = Arc::new(PoolLock::new());
        let registry = Registry::new(
            metadata.clone(),
            pool.clone(),
            config.block_size,
            config.max_blocks_per_disk,
        );
        let health = HealthTracker::new(metadata.clone(), pool.clone(), config.reenable_on_recovery);
        let allocator = Allocator::new(
            metadata.clone(),
            pool,
            PlacementManager::new(config.replicas, config.spread),
            config.block_size,
        );
        let catalog = Catalog::new(metadata.clone());

        Self {
            config,
            metadata,
            registry,
            health,
            allocator,
            catalog,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Deadline for one request, capped by the configured request timeout
    pub fn deadline(&self, caller_ms: Option<u64>) -> Deadline {
        Deadline::bounded(self.config.request_timeout(), caller_ms)
    }

    pub async fn register_disk(
        &self,
        req: DiskRegistration,
        deadline: Deadline,
    ) -> Result<Option<BlockRange>> {
        self.registry.register_disk(req, deadline).await
    }

    /// Best-effort heartbeat; failures are logged
    pub async fn report_heartbeat(&self, hb: Heartbeat, deadline: Deadline) {
        self.health.report_heartbeat(hb, deadline).await
    }

    pub async fn apply_heartbeat(&self, hb: Heartbeat, deadline: Deadline) -> Result<HeartbeatOutcome> {
        self.health.apply_heartbeat(hb, deadline).await
    }

    pub async fn create_volume(&self, name: &str, quota: u64, deadline: Deadline) -> Result<Uuid> {
        self.allocator.create_volume(name, quota, deadline).await
    }

    pub fn get_volume_info(&self, uuid: &Uuid, deadline: &Deadline) -> Result<VolumeTopology> {
        self.catalog.get_volume_info(uuid, deadline)
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        self.catalog.list_volumes()
    }

    pub fn list_disks(&self) -> Result<Vec<DiskRecord>> {
        self.metadata.list_disks()
    }

    pub fn pool_stats(&self) -> Result<PoolStats> {
        Ok(PoolStats::from_blocks(&self.metadata.list_blocks()?))
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    /// Flush the backend; the manager must not be used afterwards
    pub fn close(&self) -> Result<()> {
        tracing::info!("Closing volume manager");
        self.metadata.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Error, MemStore};
    use crate::manager::metadata::DiskStatus;
    use std::net::SocketAddr;

    fn manager() -> VolumeManager {
        VolumeManager::open(ManagerConfig::in_memory(10, 3)).unwrap()
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let result = VolumeManager::with_store(
            ManagerConfig::in_memory(0, 3),
            Arc::new(MemStore::new()),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let mgr = manager();
        for octet in 1..=3 {
            mgr.register_disk(
                DiskRegistration {
                    host: SocketAddr::from(([10, 0, 0, octet], 9000)),
                    mount_path: "/data".into(),
                    capacity: 100,
                },
                mgr.deadline(None),
            )
            .await
            .unwrap();
        }

        let uuid = mgr.create_volume("v1", 25, mgr.deadline(None)).await.unwrap();
        let topology = mgr.get_volume_info(&uuid, &mgr.deadline(None)).unwrap();
        assert_eq!(topology.groups.len(), 3);

        let stats = mgr.pool_stats().unwrap();
        assert_eq!(stats.total_blocks, 30);
        assert_eq!(stats.allocated_blocks, 9);
        assert_eq!(stats.free_blocks, 21);

        mgr.report_heartbeat(
            Heartbeat {
                host: SocketAddr::from(([10, 0, 0, 1], 9000)),
                used: 30,
                free: 70,
                status: DiskStatus::Faulty(1),
            },
            mgr.deadline(None),
        )
        .await;
        let stats = mgr.pool_stats().unwrap();
        assert_eq!(stats.disabled_blocks, 10);
        assert_eq!(stats.free_blocks, 14);

        mgr.close().unwrap();
    }

    #[test]
    fn test_deadline_is_capped() {
        let mgr = manager();
        let capped = mgr.deadline(Some(u64::MAX)).instant().unwrap();
        let limit = tokio::time::Instant::now() + mgr.config().request_timeout();
        assert!(capped <= limit);
    }
}
