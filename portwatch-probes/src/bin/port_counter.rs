//! XDP program counting TCP packets per destination port
//!
//! This program:
//! - Attaches at the XDP hook of one interface
//! - Walks Ethernet → IPv4 → TCP with a bounds check before every read
//! - Counts the packet in `PORT_COUNTS` keyed by the wire-order destination port
//! - Always returns `XDP_PASS`
//!
//! Note: This binary must be built for the bpfel-unknown-none target. The
//! root crate's build.rs handles cross-compilation automatically.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{xdp_action, BPF_NOEXIST},
    macros::{map, xdp},
    maps::{PerCpuArray, PerCpuHashMap},
    programs::XdpContext,
};
use aya_log_ebpf::warn;
use portwatch_common::{
    on_packet, Action, Frame, InsertError, PortKey, PortTable, Stat, StatSink,
    PORT_TABLE_CAPACITY, STAT_COUNT,
};

const EEXIST: i64 = 17;

/// Per-CPU so that concurrent increments never touch the same slot.
/// Userspace sums the per-CPU values.
#[map(name = "PORT_COUNTS")]
static PORT_COUNTS: PerCpuHashMap<u16, u64> =
    PerCpuHashMap::with_max_entries(PORT_TABLE_CAPACITY, 0);

#[map(name = "PORTWATCH_STATS")]
static PORTWATCH_STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_COUNT, 0);

struct XdpFrame<'a>(&'a XdpContext);

// SAFETY: the verifier guarantees [data, data_end) is the packet
unsafe impl Frame for XdpFrame<'_> {
    #[inline(always)]
    fn start(&self) -> usize {
        self.0.data()
    }

    #[inline(always)]
    fn end(&self) -> usize {
        self.0.data_end()
    }
}

struct PortCounts<'a> {
    ctx: &'a XdpContext,
}

impl PortTable for PortCounts<'_> {
    #[inline(always)]
    fn increment(&self, key: PortKey) -> bool {
        match PORT_COUNTS.get_ptr_mut(&key.raw()) {
            Some(count) => {
                // SAFETY: per-CPU slot, only this CPU writes it
                unsafe { *count = (*count).wrapping_add(1) };
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    fn insert_if_absent(&self, key: PortKey, value: u64) -> Result<(), InsertError> {
        PORT_COUNTS
            .insert(&key.raw(), &value, BPF_NOEXIST as u64)
            .map_err(|err| {
                if err == -EEXIST {
                    InsertError::Exists
                } else {
                    warn!(
                        self.ctx,
                        "port table full, dropping count for port {}",
                        key.port()
                    );
                    InsertError::Full
                }
            })
    }
}

struct Stats;

impl StatSink for Stats {
    #[inline(always)]
    fn bump(&self, stat: Stat) {
        if let Some(slot) = PORTWATCH_STATS.get_ptr_mut(stat.index()) {
            // SAFETY: per-CPU slot, only this CPU writes it
            unsafe { *slot = (*slot).wrapping_add(1) };
        }
    }
}

#[xdp]
pub fn port_counter(ctx: XdpContext) -> u32 {
    let table = PortCounts { ctx: &ctx };

    match on_packet(&XdpFrame(&ctx), &table, &Stats) {
        Action::Allow => xdp_action::XDP_PASS,
    }
}

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
