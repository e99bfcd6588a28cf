//! Bounded in-process port counter table
//!
//! Mirrors the kernel table's semantics (fixed capacity, insert-if-absent,
//! per-key atomic increment) so the counting path can run without a kernel.

use super::{CounterSource, Snapshot, StatsSnapshot};
use crate::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use portwatch_common::{InsertError, PortKey, PortTable, Recorded, Stat, StatSink, STAT_COUNT};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe port counter table with a fixed capacity
pub struct MemoryPortTable {
    counts: DashMap<u16, AtomicU64>,
    len: AtomicUsize,
    capacity: usize,
    stats: [AtomicU64; STAT_COUNT as usize],
}

impl MemoryPortTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counts: DashMap::new(),
            len: AtomicUsize::new(0),
            capacity,
            stats: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Claim room for one more key. Called with the key's shard locked.
    fn reserve_slot(&self) -> bool {
        if self.len.fetch_add(1, Ordering::AcqRel) >= self.capacity {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Atomically read and remove the count for a host-order port.
    ///
    /// The shard write lock excludes concurrent increments of the key, so an
    /// increment lands either before the removal (and is returned) or after
    /// it (and starts a fresh entry).
    pub fn take(&self, port: u16) -> Option<u64> {
        let (_, count) = self.counts.remove(&PortKey::from_port(port).raw())?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(count.into_inner())
    }
}

impl Default for MemoryPortTable {
    fn default() -> Self {
        Self::with_capacity(portwatch_common::PORT_TABLE_CAPACITY as usize)
    }
}

impl PortTable for MemoryPortTable {
    fn increment(&self, key: PortKey) -> bool {
        match self.counts.get(&key.raw()) {
            Some(count) => {
                count.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn insert_if_absent(
        &self,
        key: PortKey,
        value: u64,
    ) -> std::result::Result<(), InsertError> {
        match self.counts.entry(key.raw()) {
            Entry::Occupied(_) => Err(InsertError::Exists),
            Entry::Vacant(slot) => {
                if !self.reserve_slot() {
                    return Err(InsertError::Full);
                }
                slot.insert(AtomicU64::new(value));
                Ok(())
            }
        }
    }

    /// Lookup and insert under the key's shard lock, so `take` cannot slip
    /// between a lost insert race and the retry.
    fn upsert(&self, key: PortKey) -> Recorded {
        if self.increment(key) {
            return Recorded::Incremented;
        }

        match self.counts.entry(key.raw()) {
            Entry::Occupied(count) => {
                count.get().fetch_add(1, Ordering::Relaxed);
                Recorded::Incremented
            }
            Entry::Vacant(slot) => {
                if !self.reserve_slot() {
                    return Recorded::Dropped;
                }
                slot.insert(AtomicU64::new(1));
                Recorded::Inserted
            }
        }
    }
}

impl StatSink for MemoryPortTable {
    fn bump(&self, stat: Stat) {
        self.stats[stat.index() as usize].fetch_add(1, Ordering::Relaxed);
    }
}

impl CounterSource for MemoryPortTable {
    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::from_raw(self.counts.iter().map(|entry| {
            (*entry.key(), entry.value().load(Ordering::Relaxed))
        })))
    }

    fn get(&self, port: u16) -> Result<Option<u64>> {
        Ok(self
            .counts
            .get(&PortKey::from_port(port).raw())
            .map(|count| count.load(Ordering::Relaxed)))
    }

    fn stats(&self) -> Result<StatsSnapshot> {
        let mut values = [0u64; STAT_COUNT as usize];
        for (value, stat) in values.iter_mut().zip(self.stats.iter()) {
            *value = stat.load(Ordering::Relaxed);
        }
        Ok(StatsSnapshot::from_values(values))
    }
}
