//! Header overlays for Ethernet, IPv4 and TCP
//!
//! Every field is a byte array so the overlays have alignment 1 and can be
//! laid over any offset of a frame. Multi-byte fields stay in network order.

use core::mem;

pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_TCP: u8 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ether_type: [u8; 2],
}

impl EthHdr {
    pub const LEN: usize = mem::size_of::<EthHdr>();

    #[inline(always)]
    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }
}

/// IPv4 header without options
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: [u8; 2],
    pub id: [u8; 2],
    pub frag_off: [u8; 2],
    pub ttl: u8,
    pub protocol: u8,
    pub check: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Hdr {
    pub const LEN: usize = mem::size_of::<Ipv4Hdr>();
}

/// TCP header without options
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TcpHdr {
    pub source: [u8; 2],
    pub dest: [u8; 2],
    pub seq: [u8; 4],
    pub ack_seq: [u8; 4],
    pub doff_flags: [u8; 2],
    pub window: [u8; 2],
    pub check: [u8; 2],
    pub urg_ptr: [u8; 2],
}

impl TcpHdr {
    pub const LEN: usize = mem::size_of::<TcpHdr>();
}

/// Offset of the IPv4 header inside a frame
pub const IPV4_OFFSET: usize = EthHdr::LEN;

/// Offset of the TCP header inside a frame. The IPv4 header is assumed to
/// carry no options, so frames with IP options are read at the wrong offset.
pub const TCP_OFFSET: usize = EthHdr::LEN + Ipv4Hdr::LEN;

/// Smallest frame that can classify as TCP
pub const MIN_TCP_FRAME_LEN: usize = TCP_OFFSET + TcpHdr::LEN;

const _: () = {
    assert!(EthHdr::LEN == 14, "EthHdr must be exactly 14 bytes");
    assert!(Ipv4Hdr::LEN == 20, "Ipv4Hdr must be exactly 20 bytes");
    assert!(TcpHdr::LEN == 20, "TcpHdr must be exactly 20 bytes");
    assert!(mem::align_of::<EthHdr>() == 1);
    assert!(mem::align_of::<Ipv4Hdr>() == 1);
    assert!(mem::align_of::<TcpHdr>() == 1);
};
