//! Registry, allocation and topology properties against the library API

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;
use volmgr::common::{Deadline, Error, ManagerConfig, MemStore, SpreadPolicy, StoreBackend};
use volmgr::manager::health::Heartbeat;
use volmgr::manager::metadata::{BlockRange, DiskStatus, MetaBatch};
use volmgr::manager::registry::DiskRegistration;
use volmgr::VolumeManager;

fn host(octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, octet], 9000))
}

async fn register(mgr: &VolumeManager, octet: u8, capacity: u64) -> Option<BlockRange> {
    mgr.register_disk(
        DiskRegistration {
            host: host(octet),
            mount_path: "/data".into(),
            capacity,
        },
        Deadline::none(),
    )
    .await
    .unwrap()
}

/// Three hosts of 100 units each, block size 10, three replicas
async fn cluster(spread: SpreadPolicy) -> (VolumeManager, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    let mut config = ManagerConfig::in_memory(10, 3);
    config.spread = spread;
    let mgr = VolumeManager::with_store(config, store.clone()).unwrap();
    for octet in 1..=3 {
        register(&mgr, octet, 100).await;
    }
    (mgr, store)
}

fn allocated_count(mgr: &VolumeManager) -> u64 {
    mgr.pool_stats().unwrap().allocated_blocks
}

#[tokio::test]
async fn test_register_then_create_scenario() {
    let mgr = VolumeManager::open(ManagerConfig::in_memory(10, 3)).unwrap();
    assert_eq!(register(&mgr, 1, 100).await, Some(BlockRange { first: 1, last: 10 }));
    assert_eq!(register(&mgr, 2, 100).await, Some(BlockRange { first: 11, last: 20 }));
    assert_eq!(register(&mgr, 3, 100).await, Some(BlockRange { first: 21, last: 30 }));

    let uuid = mgr.create_volume("v1", 25, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();

    assert_eq!(info.name, "v1");
    assert_eq!(info.quota, 25);
    assert_eq!(info.groups.len(), 3);
    for group in &info.groups {
        let hosts: HashSet<_> = group.blocks.iter().map(|b| b.host).collect();
        assert_eq!(group.blocks.len(), 3);
        assert_eq!(hosts.len(), 3, "group {} reuses a host", group.group_id);
    }
    assert_eq!(allocated_count(&mgr), 9);
}

#[tokio::test]
async fn test_block_ranges_never_overlap() {
    let mgr = VolumeManager::open(ManagerConfig::in_memory(10, 3)).unwrap();
    let mut ranges = Vec::new();
    for (octet, capacity) in [(1, 100), (2, 35), (3, 5), (4, 70), (5, 10)] {
        if let Some(range) = register(&mgr, octet, capacity).await {
            ranges.push(range);
        }
    }
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
        }
    }
    let total: u64 = ranges.iter().map(|r| r.count()).sum();
    assert_eq!(total, 10 + 3 + 7 + 1);
    assert_eq!(mgr.pool_stats().unwrap().total_blocks, total);
}

#[tokio::test]
async fn test_no_block_in_two_groups() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    let mut seen = HashSet::new();
    for (i, quota) in [15u64, 30, 7, 20].into_iter().enumerate() {
        let uuid = mgr
            .create_volume(&format!("v{}", i), quota, Deadline::none())
            .await
            .unwrap();
        for group in mgr.get_volume_info(&uuid, &Deadline::none()).unwrap().groups {
            for block in group.blocks {
                assert!(seen.insert(block.block_id), "block {} reused", block.block_id);
            }
        }
    }
    // 2 + 3 + 1 + 2 groups of 3
    assert_eq!(seen.len(), 24);
    assert_eq!(allocated_count(&mgr), 24);
}

#[tokio::test]
async fn test_exhaustion_leaves_pool_untouched() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    mgr.create_volume("first", 60, Deadline::none()).await.unwrap();
    let before = mgr.pool_stats().unwrap();

    // 6 groups used, 4 left; ask for 5
    let err = mgr
        .create_volume("too-big", 50, Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AllocationExhausted { group: 4, .. }));
    assert!(err.is_retryable());

    assert_eq!(mgr.pool_stats().unwrap(), before);
    assert_eq!(mgr.list_volumes().unwrap().len(), 1);
}

#[tokio::test]
async fn test_store_failure_rolls_back_whole_volume() {
    let (mgr, store) = cluster(SpreadPolicy::Strict).await;
    let before = mgr.pool_stats().unwrap();

    store.fail_nth_write(1);
    let err = mgr
        .create_volume("v1", 25, Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    assert_eq!(mgr.pool_stats().unwrap(), before);
    assert!(mgr.list_volumes().unwrap().is_empty());

    // Pool is intact for the retry
    let uuid = mgr.create_volume("v1", 25, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    assert_eq!(info.groups.iter().map(|g| g.group_id).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_uuids_are_unique() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    let mut uuids = HashSet::new();
    for _ in 0..10 {
        uuids.insert(mgr.create_volume("same-name", 1, Deadline::none()).await.unwrap());
    }
    assert_eq!(uuids.len(), 10);
}

#[tokio::test]
async fn test_faulty_host_is_excluded() {
    let store = Arc::new(MemStore::new());
    let mgr = VolumeManager::with_store(ManagerConfig::in_memory(10, 3), store).unwrap();
    for octet in 1..=4 {
        register(&mgr, octet, 100).await;
    }

    mgr.report_heartbeat(
        Heartbeat {
            host: host(2),
            used: 0,
            free: 100,
            status: DiskStatus::Faulty(7),
        },
        Deadline::none(),
    )
    .await;

    let uuid = mgr.create_volume("v", 100, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    assert_eq!(info.groups.len(), 10);
    assert!(info
        .groups
        .iter()
        .flat_map(|g| &g.blocks)
        .all(|b| b.host != host(2)));

    let disk = mgr
        .list_disks()
        .unwrap()
        .into_iter()
        .find(|d| d.host == host(2))
        .unwrap();
    assert_eq!(disk.status, DiskStatus::Faulty(7));
}

#[tokio::test]
async fn test_strict_spread_fails_once_hosts_are_faulty() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    mgr.report_heartbeat(
        Heartbeat {
            host: host(3),
            used: 0,
            free: 100,
            status: DiskStatus::Faulty(1),
        },
        Deadline::none(),
    )
    .await;

    assert!(matches!(
        mgr.create_volume("v", 10, Deadline::none()).await,
        Err(Error::AllocationExhausted { group: 0, .. })
    ));
}

#[tokio::test]
async fn test_datanodes_on_one_machine_are_one_host() {
    let mut config = ManagerConfig::in_memory(10, 3);
    config.spread = SpreadPolicy::Strict;
    let mgr = VolumeManager::open(config).unwrap();
    for port in 9000..9003 {
        mgr.register_disk(
            DiskRegistration {
                host: SocketAddr::from(([10, 0, 0, 1], port)),
                mount_path: "/data".into(),
                capacity: 100,
            },
            Deadline::none(),
        )
        .await
        .unwrap();
    }

    assert!(matches!(
        mgr.create_volume("v", 10, Deadline::none()).await,
        Err(Error::AllocationExhausted { group: 0, .. })
    ));
    assert_eq!(allocated_count(&mgr), 0);

    // A second machine is still short of three
    register(&mgr, 2, 100).await;
    assert!(mgr.create_volume("v", 10, Deadline::none()).await.is_err());
    register(&mgr, 3, 100).await;
    let uuid = mgr.create_volume("v", 10, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    let ips: HashSet<_> = info.groups[0].blocks.iter().map(|b| b.host.ip()).collect();
    assert_eq!(ips.len(), 3);
}

#[tokio::test]
async fn test_topology_reflects_current_block_rows() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    let uuid = mgr.create_volume("v", 10, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    let moved = info.groups[0].blocks[0].block_id;

    // Re-home one block's row and query again
    let metadata = mgr.metadata();
    let mut block = metadata.get_block(moved).unwrap().unwrap();
    block.host = SocketAddr::from(([192, 168, 1, 1], 9100));
    let mut batch = MetaBatch::new();
    batch.put_block(&block).unwrap();
    metadata.commit(batch).unwrap();

    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    let location = info.groups[0]
        .blocks
        .iter()
        .find(|b| b.block_id == moved)
        .unwrap();
    assert_eq!(location.host, SocketAddr::from(([192, 168, 1, 1], 9100)));
}

#[tokio::test]
async fn test_unknown_volume() {
    let (mgr, _) = cluster(SpreadPolicy::Strict).await;
    assert!(matches!(
        mgr.get_volume_info(&Uuid::new_v4(), &Deadline::none()),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rocksdb_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ManagerConfig::in_memory(10, 3);
    config.backend = StoreBackend::Rocksdb;
    config.db_path = dir.path().join("meta");

    let uuid = {
        let mgr = VolumeManager::open(config.clone()).unwrap();
        for octet in 1..=3 {
            register(&mgr, octet, 100).await;
        }
        let uuid = mgr.create_volume("durable", 25, Deadline::none()).await.unwrap();
        mgr.close().unwrap();
        uuid
    };

    let mgr = VolumeManager::open(config).unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    assert_eq!(info.name, "durable");
    assert_eq!(info.groups.len(), 3);
    assert_eq!(allocated_count(&mgr), 9);

    // Id sequences continue after reopen
    assert_eq!(register(&mgr, 4, 20).await, Some(BlockRange { first: 31, last: 32 }));
    let next = mgr.create_volume("next", 5, Deadline::none()).await.unwrap();
    let groups = mgr.get_volume_info(&next, &Deadline::none()).unwrap().groups;
    assert_eq!(groups[0].group_id, 4);
}
