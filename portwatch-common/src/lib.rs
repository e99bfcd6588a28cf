//! Shared code between the XDP program (kernel) and userspace
//!
//! This crate holds everything both sides must agree on:
//! - `#[repr(C)]` header overlays and the bounds-checked classifier
//! - the insert-or-increment counting protocol over a [`PortTable`]
//! - map names, table capacity, and statistics slot indices
//!
//! It is `no_std` unless the `userspace` feature is enabled, so the exact
//! same classifier runs inside the verifier-checked program and in host tests.

#![cfg_attr(not(feature = "userspace"), no_std)]

pub mod classify;
pub mod counting;
pub mod headers;

#[cfg(feature = "userspace")]
pub mod frames;

pub use classify::{classify, Decision, Frame, Skip};
pub use counting::{on_packet, record, Action, InsertError, PortTable, Recorded, StatSink};

/// Name of the per-CPU hash map holding packet counts per destination port
pub const PORT_COUNTS_MAP: &str = "PORT_COUNTS";

/// Name of the per-CPU array holding classification statistics
pub const STATS_MAP: &str = "PORTWATCH_STATS";

/// Name of the XDP program inside the compiled object
pub const PROGRAM_NAME: &str = "port_counter";

/// Maximum number of distinct ports the counter table can hold.
/// Every 16-bit port fits, so a full table only happens if the map is
/// recreated with a smaller size.
pub const PORT_TABLE_CAPACITY: u32 = 65536;

/// Destination port as it appears on the wire.
///
/// The two header bytes are reinterpreted natively without swapping, which is
/// the same value a C program gets from `tcp->dest`. Counter table keys use
/// this representation; readers convert with [`PortKey::port`].
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortKey(u16);

impl PortKey {
    /// Build a key from the two raw header bytes
    #[inline(always)]
    pub const fn from_wire(bytes: [u8; 2]) -> Self {
        Self(u16::from_ne_bytes(bytes))
    }

    /// Build a key from a host-order port number
    #[inline(always)]
    pub const fn from_port(port: u16) -> Self {
        Self(port.to_be())
    }

    /// Rebuild a key from a raw map key
    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw map key (wire byte order)
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The port number in host byte order
    #[inline(always)]
    pub const fn port(self) -> u16 {
        u16::from_be(self.0)
    }
}

/// Slots of the per-CPU statistics array
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stat {
    /// TCP packet recorded in the counter table
    Counted = 0,
    ShortEthernet = 1,
    NotIpv4 = 2,
    ShortIpv4 = 3,
    NotTcp = 4,
    ShortTcp = 5,
    /// TCP packet whose count was dropped because the table was full
    TableFull = 6,
}

/// Number of slots in the statistics array
pub const STAT_COUNT: u32 = 7;

impl Stat {
    pub const ALL: [Stat; STAT_COUNT as usize] = [
        Stat::Counted,
        Stat::ShortEthernet,
        Stat::NotIpv4,
        Stat::ShortIpv4,
        Stat::NotTcp,
        Stat::ShortTcp,
        Stat::TableFull,
    ];

    #[inline(always)]
    pub const fn index(self) -> u32 {
        self as u32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stat::Counted => "counted",
            Stat::ShortEthernet => "short_ethernet",
            Stat::NotIpv4 => "not_ipv4",
            Stat::ShortIpv4 => "short_ipv4",
            Stat::NotTcp => "not_tcp",
            Stat::ShortTcp => "short_tcp",
            Stat::TableFull => "table_full",
        }
    }
}
