//! Replica placement for block groups
//!
//! Candidates are drawn from distinct hosts uniformly at random, one block per
//! host, so repeated allocations do not pile onto the same datanodes. A host is
//! a fault domain keyed by IP address: datanodes on different ports of one
//! machine share it. When fewer hosts than replicas have eligible blocks the
//! [`SpreadPolicy`] decides between failing and reusing hosts.

use crate::common::SpreadPolicy;
use crate::manager::metadata::{BlockId, BlockRecord};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Eligible blocks grouped by owning host IP
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    by_host: BTreeMap<IpAddr, Vec<BlockId>>,
    len: usize,
}

impl CandidatePool {
    /// Keep only blocks that are neither allocated nor disabled
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a BlockRecord>) -> Self {
        let mut pool = Self::default();
        for block in blocks.into_iter().filter(|b| b.is_eligible()) {
            pool.by_host.entry(block.host.ip()).or_default().push(block.block_id);
            pool.len += 1;
        }
        pool
    }

    /// Number of eligible blocks left
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of host IPs with at least one eligible block
    pub fn host_count(&self) -> usize {
        self.by_host.len()
    }

    /// Remove a random block owned by `host`
    fn take_from<R: Rng>(&mut self, host: &IpAddr, rng: &mut R) -> Option<BlockId> {
        let blocks = self.by_host.get_mut(host)?;
        let idx = rng.gen_range(0..blocks.len());
        let id = blocks.swap_remove(idx);
        if blocks.is_empty() {
            self.by_host.remove(host);
        }
        self.len -= 1;
        Some(id)
    }
}

/// PlacementManager picks the blocks of each replica set.
#[derive(Debug, Clone, Copy)]
pub struct PlacementManager {
    /// Blocks per group
    replicas: usize,
    spread: SpreadPolicy,
}

impl PlacementManager {
    pub fn new(replicas: usize, spread: SpreadPolicy) -> Self {
        Self { replicas, spread }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Take one group of exactly `replicas` distinct blocks out of `pool`.
    ///
    /// Returns `None`, leaving `pool` untouched, when the group cannot be
    /// filled under the configured spread policy.
    pub fn select_group<R: Rng>(
        &self,
        pool: &mut CandidatePool,
        rng: &mut R,
    ) -> Option<Vec<BlockId>> {
        if pool.len() < self.replicas {
            return None;
        }
        if self.spread == SpreadPolicy::Strict && pool.host_count() < self.replicas {
            return None;
        }

        let mut hosts: Vec<IpAddr> = pool.by_host.keys().copied().collect();
        hosts.shuffle(rng);
        hosts.truncate(self.replicas);

        let mut group = Vec::with_capacity(self.replicas);
        for host in &hosts {
            group.extend(pool.take_from(host, rng));
        }

        // Best effort: top up from hosts already in the group
        while group.len() < self.replicas {
            let hosts: Vec<IpAddr> = pool.by_host.keys().copied().collect();
            let host = hosts.choose(rng)?;
            group.extend(pool.take_from(host, rng));
        }

        Some(group)
    }
}
