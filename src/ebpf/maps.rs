//! Userspace handles on the XDP program's maps

use crate::table::{sum_per_cpu, CounterSource, Snapshot, StatsSnapshot};
use crate::{PortwatchError, Result};
use aya::maps::{MapData, MapError, PerCpuArray, PerCpuHashMap};
use aya::Ebpf;
use portwatch_common::{PortKey, Stat, PORT_COUNTS_MAP, STATS_MAP, STAT_COUNT};

/// Read access to `PORT_COUNTS` and `PORTWATCH_STATS`.
///
/// Values are per-CPU and merged here. No reset is offered:
/// deleting a per-CPU key cannot be made atomic with respect to in-flight
/// increments, so consumers diff successive snapshots instead.
pub struct KernelCounters {
    counts: PerCpuHashMap<MapData, u16, u64>,
    stats: PerCpuArray<MapData, u64>,
}

impl KernelCounters {
    pub fn from_ebpf(bpf: &mut Ebpf) -> Result<Self> {
        let counts = take_map(bpf, PORT_COUNTS_MAP)?;
        let counts: PerCpuHashMap<MapData, u16, u64> =
            PerCpuHashMap::try_from(counts).map_err(|e| map_error(PORT_COUNTS_MAP, e))?;

        let stats = take_map(bpf, STATS_MAP)?;
        let stats: PerCpuArray<MapData, u64> =
            PerCpuArray::try_from(stats).map_err(|e| map_error(STATS_MAP, e))?;

        Ok(Self { counts, stats })
    }
}

impl CounterSource for KernelCounters {
    fn snapshot(&self) -> Result<Snapshot> {
        let mut entries = Vec::new();
        for item in self.counts.iter() {
            match item {
                Ok((raw, per_cpu)) => entries.push((raw, sum_per_cpu(per_cpu.iter()))),
                // Key deleted between listing and lookup
                Err(MapError::KeyNotFound) => continue,
                Err(e) => return Err(map_error(PORT_COUNTS_MAP, e)),
            }
        }
        Ok(Snapshot::from_raw(entries))
    }

    fn get(&self, port: u16) -> Result<Option<u64>> {
        match self.counts.get(&PortKey::from_port(port).raw(), 0) {
            Ok(per_cpu) => Ok(Some(sum_per_cpu(per_cpu.iter()))),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(map_error(PORT_COUNTS_MAP, e)),
        }
    }

    fn stats(&self) -> Result<StatsSnapshot> {
        let mut values = [0u64; STAT_COUNT as usize];
        for stat in Stat::ALL {
            let per_cpu = self
                .stats
                .get(&stat.index(), 0)
                .map_err(|e| map_error(STATS_MAP, e))?;
            values[stat.index() as usize] = sum_per_cpu(per_cpu.iter());
        }
        Ok(StatsSnapshot::from_values(values))
    }
}

fn take_map(bpf: &mut Ebpf, name: &str) -> Result<aya::maps::Map> {
    // Collect map names first to avoid borrow conflict in error path
    let available: Vec<_> = bpf.maps().map(|(name, _)| name.to_string()).collect();
    bpf.take_map(name).ok_or_else(|| {
        PortwatchError::MapError(format!(
            "{} map not found in eBPF object. Available maps: {:?}",
            name, available
        ))
    })
}

fn map_error(name: &str, err: MapError) -> PortwatchError {
    PortwatchError::MapError(format!("{}: {}", name, err))
}
