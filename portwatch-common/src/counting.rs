//! Insert-or-increment counting over a port table

use crate::classify::{classify, Decision, Frame};
use crate::{PortKey, Stat};

/// Why an insert did not create a new entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertError {
    /// Another writer created the key first
    Exists,
    /// The table has no room for another key
    Full,
}

/// Capability over the port counter table.
///
/// Implementations must make `increment` indivisible per key, either with a
/// real atomic add or by partitioning storage so that no two writers share a
/// slot (a per-CPU map).
pub trait PortTable {
    /// Add one to the count for `key`. Returns `false` if the key is absent.
    fn increment(&self, key: PortKey) -> bool;

    /// Create `key` with `value`, never overwriting an existing entry.
    fn insert_if_absent(&self, key: PortKey, value: u64) -> Result<(), InsertError>;

    /// Count one packet for `key`.
    ///
    /// Defaults to [`record`]. Tables that can lock a key across the lookup
    /// and the insert override this so a concurrent removal cannot make the
    /// retry miss.
    #[inline(always)]
    fn upsert(&self, key: PortKey) -> Recorded {
        record(self, key)
    }
}

/// Sink for classification statistics
pub trait StatSink {
    fn bump(&self, stat: Stat);
}

impl StatSink for () {
    #[inline(always)]
    fn bump(&self, _stat: Stat) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    Inserted,
    Incremented,
    /// Table full; the count is lost but the packet is unaffected
    Dropped,
}

/// Verdict returned to the host. Monitoring never affects delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Allow,
}

/// Count one packet for `key` using only `increment` and `insert_if_absent`.
///
/// If the key is removed between a lost insert race and the retry, the count
/// is dropped. The kernel table has no removal path, so this cannot happen
/// there.
#[inline(always)]
pub fn record<T: PortTable + ?Sized>(table: &T, key: PortKey) -> Recorded {
    if table.increment(key) {
        return Recorded::Incremented;
    }

    match table.insert_if_absent(key, 1) {
        Ok(()) => Recorded::Inserted,
        // Lost the insert race; the entry exists now. One retry, no loop.
        Err(InsertError::Exists) => {
            if table.increment(key) {
                Recorded::Incremented
            } else {
                Recorded::Dropped
            }
        }
        Err(InsertError::Full) => Recorded::Dropped,
    }
}

/// Classify one frame and count it if it is TCP. Always allows the packet.
#[inline(always)]
pub fn on_packet<F, T, S>(frame: &F, table: &T, stats: &S) -> Action
where
    F: Frame + ?Sized,
    T: PortTable + ?Sized,
    S: StatSink + ?Sized,
{
    match classify(frame) {
        Decision::TcpPacket(key) => match table.upsert(key) {
            Recorded::Inserted | Recorded::Incremented => stats.bump(Stat::Counted),
            Recorded::Dropped => stats.bump(Stat::TableFull),
        },
        Decision::Uninteresting(skip) => stats.bump(skip.stat()),
    }

    Action::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::FrameBuilder;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    struct FakeTable {
        entries: RefCell<BTreeMap<u16, u64>>,
        capacity: usize,
        /// Pretend another writer inserts this key right before our insert
        racing_key: Cell<Option<PortKey>>,
    }

    impl FakeTable {
        fn with_capacity(capacity: usize) -> Self {
            Self {
                entries: RefCell::new(BTreeMap::new()),
                capacity,
                racing_key: Cell::new(None),
            }
        }

        fn count(&self, port: u16) -> Option<u64> {
            self.entries
                .borrow()
                .get(&PortKey::from_port(port).raw())
                .copied()
        }
    }

    impl PortTable for FakeTable {
        fn increment(&self, key: PortKey) -> bool {
            match self.entries.borrow_mut().get_mut(&key.raw()) {
                Some(count) => {
                    *count += 1;
                    true
                }
                None => false,
            }
        }

        fn insert_if_absent(&self, key: PortKey, value: u64) -> Result<(), InsertError> {
            let mut entries = self.entries.borrow_mut();
            if self.racing_key.take() == Some(key) {
                entries.insert(key.raw(), 1);
            }
            if entries.contains_key(&key.raw()) {
                return Err(InsertError::Exists);
            }
            if entries.len() >= self.capacity {
                return Err(InsertError::Full);
            }
            entries.insert(key.raw(), value);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStats(RefCell<BTreeMap<Stat, u64>>);

    impl StatSink for FakeStats {
        fn bump(&self, stat: Stat) {
            *self.0.borrow_mut().entry(stat).or_default() += 1;
        }
    }

    impl FakeStats {
        fn get(&self, stat: Stat) -> u64 {
            self.0.borrow().get(&stat).copied().unwrap_or(0)
        }
    }

    #[test]
    fn test_record_inserts_then_increments() {
        let table = FakeTable::with_capacity(16);
        let key = PortKey::from_port(22);

        assert_eq!(record(&table, key), Recorded::Inserted);
        assert_eq!(record(&table, key), Recorded::Incremented);
        assert_eq!(table.count(22), Some(2));
    }

    #[test]
    fn test_record_retries_after_lost_insert_race() {
        let table = FakeTable::with_capacity(16);
        let key = PortKey::from_port(8443);
        table.racing_key.set(Some(key));

        assert_eq!(record(&table, key), Recorded::Incremented);
        assert_eq!(table.count(8443), Some(2));
    }

    #[test]
    fn test_record_drops_when_full() {
        let table = FakeTable::with_capacity(1);
        record(&table, PortKey::from_port(80));

        assert_eq!(record(&table, PortKey::from_port(81)), Recorded::Dropped);
        assert_eq!(table.count(81), None);
        // Existing keys keep counting
        assert_eq!(record(&table, PortKey::from_port(80)), Recorded::Incremented);
    }

    #[test]
    fn test_on_packet_counts_443() {
        let table = FakeTable::with_capacity(16);
        let stats = FakeStats::default();
        let frame = FrameBuilder::tcp(443).build();

        assert_eq!(on_packet(frame.as_slice(), &table, &stats), Action::Allow);
        assert_eq!(table.count(443), Some(1));
        assert_eq!(table.entries.borrow().len(), 1);
        assert_eq!(stats.get(Stat::Counted), 1);
    }

    #[test]
    fn test_on_packet_1000_frames_to_port_80() {
        let table = FakeTable::with_capacity(16);
        record(&table, PortKey::from_port(443));
        let frame = FrameBuilder::tcp(80).build();

        for _ in 0..1000 {
            on_packet(frame.as_slice(), &table, &());
        }

        assert_eq!(table.count(80), Some(1000));
        assert_eq!(table.count(443), Some(1));
    }

    #[test]
    fn test_on_packet_short_buffer_leaves_table_unchanged() {
        let table = FakeTable::with_capacity(16);
        let stats = FakeStats::default();

        assert_eq!(on_packet(&[0u8; 10][..], &table, &stats), Action::Allow);
        assert!(table.entries.borrow().is_empty());
        assert_eq!(stats.get(Stat::ShortEthernet), 1);
    }

    #[test]
    fn test_on_packet_skips_udp_and_ipv6() {
        let table = FakeTable::with_capacity(16);
        let stats = FakeStats::default();

        let udp = FrameBuilder::tcp(53).protocol(17).build();
        let ipv6 = FrameBuilder::tcp(443).ether_type(0x86dd).build();
        assert_eq!(on_packet(udp.as_slice(), &table, &stats), Action::Allow);
        assert_eq!(on_packet(ipv6.as_slice(), &table, &stats), Action::Allow);

        assert!(table.entries.borrow().is_empty());
        assert_eq!(stats.get(Stat::NotTcp), 1);
        assert_eq!(stats.get(Stat::NotIpv4), 1);
    }

    #[test]
    fn test_on_packet_uses_table_upsert() {
        struct AlwaysInserts(Cell<u32>);

        impl PortTable for AlwaysInserts {
            fn increment(&self, _key: PortKey) -> bool {
                unreachable!("upsert is overridden")
            }

            fn insert_if_absent(&self, _key: PortKey, _value: u64) -> Result<(), InsertError> {
                unreachable!("upsert is overridden")
            }

            fn upsert(&self, _key: PortKey) -> Recorded {
                self.0.set(self.0.get() + 1);
                Recorded::Inserted
            }
        }

        let table = AlwaysInserts(Cell::new(0));
        let stats = FakeStats::default();
        let frame = FrameBuilder::tcp(443).build();

        on_packet(frame.as_slice(), &table, &stats);
        assert_eq!(table.0.get(), 1);
        assert_eq!(stats.get(Stat::Counted), 1);
    }

    #[test]
    fn test_on_packet_full_table_still_allows() {
        let table = FakeTable::with_capacity(0);
        let stats = FakeStats::default();
        let frame = FrameBuilder::tcp(443).build();

        assert_eq!(on_packet(frame.as_slice(), &table, &stats), Action::Allow);
        assert_eq!(stats.get(Stat::TableFull), 1);
        assert_eq!(stats.get(Stat::Counted), 0);
    }
}
