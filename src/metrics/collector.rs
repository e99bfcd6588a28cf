use crate::table::{CounterSource, Snapshot, StatsSnapshot};
use crate::Result;
use portwatch_common::Stat;

/// Growth of one port's count between two polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDelta {
    pub port: u16,
    pub total: u64,
    pub delta: u64,
}

/// Result of one poll of the counter table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Poll {
    /// Ports whose count grew, in port order
    pub deltas: Vec<PortDelta>,
    /// Growth of each classification statistic
    pub stat_deltas: Vec<(Stat, u64)>,
    pub tracked_ports: usize,
}

impl Poll {
    pub fn delta(&self, port: u16) -> u64 {
        self.deltas
            .iter()
            .find(|d| d.port == port)
            .map(|d| d.delta)
            .unwrap_or(0)
    }

    pub fn stat_delta(&self, stat: Stat) -> u64 {
        self.stat_deltas
            .iter()
            .find(|(s, _)| *s == stat)
            .map(|(_, delta)| *delta)
            .unwrap_or(0)
    }
}

/// Turns monotonically growing counters into per-poll deltas.
///
/// Do not combine with [`MemoryPortTable::take`](crate::table::MemoryPortTable::take)
/// on the same table. A key drained between two polls is only seen as reset
/// when its new value is below the old one; if it climbs back to the old
/// value or above, the drained count is lost from the deltas.
#[derive(Debug, Default)]
pub struct PortCollector {
    previous: Snapshot,
    previous_stats: StatsSnapshot,
    polls: u64,
}

impl PortCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<S: CounterSource + ?Sized>(&mut self, source: &S) -> Result<Poll> {
        let current = source.snapshot()?;
        let stats = source.stats()?;

        let deltas = current
            .iter()
            .filter_map(|(port, total)| {
                let delta = counter_delta(self.previous.get(port), total);
                (delta > 0).then_some(PortDelta { port, total, delta })
            })
            .collect();

        let stat_deltas = stats
            .iter()
            .map(|(stat, value)| {
                (
                    stat,
                    counter_delta(Some(self.previous_stats.get(stat)), value),
                )
            })
            .collect();

        let poll = Poll {
            deltas,
            stat_deltas,
            tracked_ports: current.len(),
        };

        self.previous = current;
        self.previous_stats = stats;
        self.polls += 1;

        Ok(poll)
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Most recent snapshot seen by `poll`
    pub fn last_snapshot(&self) -> &Snapshot {
        &self.previous
    }
}

/// A value below the previous one means the key was deleted and recreated,
/// so everything in it is new.
fn counter_delta(previous: Option<u64>, current: u64) -> u64 {
    match previous {
        Some(previous) if current >= previous => current - previous,
        _ => current,
    }
}
