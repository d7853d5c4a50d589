//! Persistent and in-memory metadata backends
//!
//! Every backend exposes the same small contract: point reads, ordered
//! prefix scans, and an atomic batch commit. Higher layers never issue a
//! write outside a [`Batch`], so a failed commit leaves no trace.

use crate::common::{Error, Result};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Logical relations kept by the volume manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Disks,
    Blocks,
    Volumes,
    BlockGroups,
    Counters,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Disks,
        Table::Blocks,
        Table::Volumes,
        Table::BlockGroups,
        Table::Counters,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Disks => "disks",
            Table::Blocks => "blocks",
            Table::Volumes => "volumes",
            Table::BlockGroups => "block_groups",
            Table::Counters => "counters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteOp {
    table: Table,
    key: Vec<u8>,
    value: Vec<u8>,
}

/// Ordered set of writes applied all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.ops.push(WriteOp {
            table,
            key: key.into(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Trait for metadata storage backends
pub trait MetaStore: Send + Sync {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every write in `batch` atomically
    fn commit(&self, batch: Batch) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// RocksDB store, one column family per table
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, Table::ALL.iter().map(|t| t.name()))?;

        Ok(Self { db })
    }

    fn cf(&self, table: Table) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| Error::MetadataCorrupted(format!("missing column family {}", table.name())))
    }
}

impl MetaStore for RocksStore {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf(table)?, key)?)
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator_cf(self.cf(table)?, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        let mut wb = rocksdb::WriteBatch::default();
        for WriteOp { table, key, value } in batch.ops {
            wb.put_cf(self.cf(table)?, key, value);
        }
        self.db.write(wb)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        for table in Table::ALL {
            self.db.flush_cf(self.cf(table)?)?;
        }
        Ok(())
    }
}

type Tables = HashMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory store with optional fault injection
#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
    faults: FaultInjector,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th read from now (1-based) fail with a store error
    pub fn fail_nth_read(&self, n: u64) {
        self.faults.reads.store(n, Ordering::SeqCst);
    }

    /// Make the `n`-th commit from now (1-based) fail with a store error
    pub fn fail_nth_write(&self, n: u64) {
        self.faults.writes.store(n, Ordering::SeqCst);
    }

    fn read_check(&self, table: Table) -> Result<()> {
        if FaultInjector::trip(&self.faults.reads) {
            return Err(Error::Store(format!("injected read failure on {}", table.name())));
        }
        Ok(())
    }
}

/// Countdown triggers; zero means disarmed
#[derive(Debug, Default)]
struct FaultInjector {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl FaultInjector {
    fn trip(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|prev| prev == 1)
            .unwrap_or(false)
    }
}

impl MetaStore for MemStore {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read_check(table)?;
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&table).and_then(|t| t.get(key)).cloned())
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.read_check(table)?;
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(map) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        if FaultInjector::trip(&self.faults.writes) {
            return Err(Error::Store(format!(
                "injected write failure ({} ops discarded)",
                batch.len()
            )));
        }
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for WriteOp { table, key, value } in batch.ops {
            tables.entry(table).or_default().insert(key, value);
        }
        Ok(())
    }
}
