//! Read side of the port counter table
//!
//! Table keys are destination ports in wire byte order. Conversion to host
//! order happens here, at the reader boundary, and nowhere else.

pub mod memory;

use crate::Result;
use portwatch_common::{PortKey, Stat, STAT_COUNT};
use std::collections::BTreeMap;

pub use memory::MemoryPortTable;

/// Merged view of the counter table, keyed by host-order port.
///
/// There is no snapshot isolation: keys are read one at a time while the
/// writers keep counting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    counts: BTreeMap<u16, u64>,
}

impl Snapshot {
    /// Build a snapshot from raw (wire-order key, count) pairs
    pub fn from_raw<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, u64)>,
    {
        let counts = entries
            .into_iter()
            .map(|(raw, count)| (PortKey::from_raw(raw).port(), count))
            .collect();
        Self { counts }
    }

    pub fn get(&self, port: u16) -> Option<u64> {
        self.counts.get(&port).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.counts.iter().map(|(port, count)| (*port, *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts, wrapping on overflow like the counters themselves
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, count| acc.wrapping_add(*count))
    }
}

/// Classification statistics, one merged value per [`Stat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    values: [u64; STAT_COUNT as usize],
}

impl StatsSnapshot {
    pub fn from_values(values: [u64; STAT_COUNT as usize]) -> Self {
        Self { values }
    }

    pub fn get(&self, stat: Stat) -> u64 {
        self.values[stat.index() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stat, u64)> + '_ {
        Stat::ALL.iter().map(move |stat| (*stat, self.get(*stat)))
    }
}

/// Anything the reader can drain counts from: the kernel map or an
/// in-process table.
pub trait CounterSource {
    /// Enumerate every (port, count) pair
    fn snapshot(&self) -> Result<Snapshot>;

    /// Read a single port's count
    fn get(&self, port: u16) -> Result<Option<u64>>;

    fn stats(&self) -> Result<StatsSnapshot>;
}

/// Merge per-CPU slots of one counter
pub fn sum_per_cpu<'a, I>(values: I) -> u64
where
    I: IntoIterator<Item = &'a u64>,
{
    values
        .into_iter()
        .fold(0u64, |acc, value| acc.wrapping_add(*value))
}
