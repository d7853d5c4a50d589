//! Races between allocations, heartbeats and registrations

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use volmgr::common::{Deadline, Error, ManagerConfig, SpreadPolicy};
use volmgr::manager::health::Heartbeat;
use volmgr::manager::metadata::DiskStatus;
use volmgr::manager::registry::DiskRegistration;
use volmgr::VolumeManager;

fn host(octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, octet], 9000))
}

async fn cluster(hosts: u8, spread: SpreadPolicy) -> Arc<VolumeManager> {
    let mut config = ManagerConfig::in_memory(10, 3);
    config.spread = spread;
    let mgr = Arc::new(VolumeManager::open(config).unwrap());
    for octet in 1..=hosts {
        mgr.register_disk(
            DiskRegistration {
                host: host(octet),
                mount_path: "/data".into(),
                capacity: 100,
            },
            Deadline::none(),
        )
        .await
        .unwrap();
    }
    mgr
}

/// Every allocated block belongs to exactly one group, and vice versa
fn assert_pool_consistent(mgr: &VolumeManager) {
    let mut owner = HashMap::new();
    for volume in mgr.list_volumes().unwrap() {
        let info = mgr.get_volume_info(&volume.uuid, &Deadline::none()).unwrap();
        for group in info.groups {
            assert_eq!(group.blocks.len(), 3);
            for block in group.blocks {
                assert!(
                    owner.insert(block.block_id, group.group_id).is_none(),
                    "block {} in two groups",
                    block.block_id
                );
            }
        }
    }
    let allocated: HashSet<_> = mgr
        .metadata()
        .list_blocks()
        .unwrap()
        .into_iter()
        .filter(|b| b.allocated)
        .map(|b| b.block_id)
        .collect();
    assert_eq!(allocated, owner.keys().copied().collect());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_share_blocks() {
    // 30 blocks = 10 single-group volumes at most
    let mgr = cluster(3, SpreadPolicy::Strict).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let mgr = mgr.clone();
        handles.push(tokio::spawn(async move {
            mgr.create_volume(&format!("vol-{}", i), 10, Deadline::none())
                .await
        }));
    }

    let mut created = 0;
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::AllocationExhausted { .. }) => exhausted += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 10);
    assert_eq!(exhausted, 6);
    assert_eq!(mgr.pool_stats().unwrap().free_blocks, 0);
    assert_pool_consistent(&mgr);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fault_heartbeat_racing_allocations() {
    let mgr = cluster(4, SpreadPolicy::Strict).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let mgr = mgr.clone();
        handles.push(tokio::spawn(async move {
            mgr.create_volume(&format!("vol-{}", i), 10, Deadline::none())
                .await
                .map(|_| ())
        }));
    }
    let faulty = {
        let mgr = mgr.clone();
        tokio::spawn(async move {
            for _ in 0..2 {
                mgr.report_heartbeat(
                    Heartbeat {
                        host: host(4),
                        used: 10,
                        free: 90,
                        status: DiskStatus::Faulty(1),
                    },
                    Deadline::none(),
                )
                .await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    faulty.await.unwrap();

    // All of host 4's blocks are disabled, none half-way
    let blocks = mgr.metadata().list_blocks().unwrap();
    assert!(blocks
        .iter()
        .filter(|b| b.host == host(4))
        .all(|b| b.disabled));
    assert_pool_consistent(&mgr);

    // Allocations after the fault never land on host 4
    let uuid = mgr.create_volume("after", 10, Deadline::none()).await.unwrap();
    let info = mgr.get_volume_info(&uuid, &Deadline::none()).unwrap();
    assert!(info.groups[0].blocks.iter().all(|b| b.host != host(4)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_get_disjoint_ranges() {
    let mgr = Arc::new(VolumeManager::open(ManagerConfig::in_memory(10, 3)).unwrap());

    let mut handles = Vec::new();
    for octet in 1..=12u8 {
        let mgr = mgr.clone();
        handles.push(tokio::spawn(async move {
            mgr.register_disk(
                DiskRegistration {
                    host: host(octet),
                    mount_path: "/data".into(),
                    capacity: 10 * u64::from(octet),
                },
                Deadline::none(),
            )
            .await
        }));
    }

    let mut ranges = Vec::new();
    for handle in handles {
        ranges.push(handle.await.unwrap().unwrap().unwrap());
    }
    ranges.sort_by_key(|r| r.first);

    // Contiguous from 1 with no gaps or overlaps
    let mut next = 1;
    for range in &ranges {
        assert_eq!(range.first, next);
        next = range.last + 1;
    }
    assert_eq!(next - 1, (1..=12).sum::<u64>());
}

#[tokio::test]
async fn test_expired_deadline_commits_nothing() {
    let mgr = cluster(3, SpreadPolicy::Strict).await;
    let short = Deadline::after(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(matches!(
        mgr.create_volume("late", 10, short).await,
        Err(Error::Timeout(_))
    ));
    assert!(mgr.list_volumes().unwrap().is_empty());
    assert_eq!(mgr.pool_stats().unwrap().allocated_blocks, 0);
}
