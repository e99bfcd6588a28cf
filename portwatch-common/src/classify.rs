//! Bounds-checked Ethernet → IPv4 → TCP classifier
//!
//! The walk is a fixed chain of validate-then-advance stages with no
//! back-edges. Each stage proves its overlay lies inside the frame before
//! reading it, and the first failing stage ends classification.

use core::mem;

use crate::headers::{EthHdr, Ipv4Hdr, TcpHdr, ETH_P_IP, IPPROTO_TCP, IPV4_OFFSET, TCP_OFFSET};
use crate::{PortKey, Stat};

/// A contiguous packet buffer described by its start and end addresses.
///
/// `end` is exclusive. [`classify`] reads headers straight from these
/// addresses once they fit below `end`.
///
/// # Safety
///
/// Every address in `[start, end)` must be readable for as long as the
/// implementor is borrowed, and `start <= end` must hold.
///
/// ```compile_fail
/// use portwatch_common::Frame;
///
/// struct Bogus;
///
/// impl Frame for Bogus {
///     fn start(&self) -> usize { 0x10 }
///     fn end(&self) -> usize { usize::MAX }
/// }
/// ```
pub unsafe trait Frame {
    fn start(&self) -> usize;
    fn end(&self) -> usize;
}

// SAFETY: a slice is readable over its whole length
unsafe impl Frame for [u8] {
    #[inline(always)]
    fn start(&self) -> usize {
        self.as_ptr() as usize
    }

    #[inline(always)]
    fn end(&self) -> usize {
        self.as_ptr() as usize + self.len()
    }
}

/// Why a frame was passed through without being counted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    ShortEthernet,
    NotIpv4,
    ShortIpv4,
    NotTcp,
    ShortTcp,
}

impl Skip {
    pub const fn stat(self) -> Stat {
        match self {
            Skip::ShortEthernet => Stat::ShortEthernet,
            Skip::NotIpv4 => Stat::NotIpv4,
            Skip::ShortIpv4 => Stat::ShortIpv4,
            Skip::NotTcp => Stat::NotTcp,
            Skip::ShortTcp => Stat::ShortTcp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Uninteresting(Skip),
    TcpPacket(PortKey),
}

/// Returns a pointer to a `T` at `offset`, or `None` if `T` does not fit
/// entirely before the end of the frame.
#[inline(always)]
fn overlay<F: Frame + ?Sized, T>(frame: &F, offset: usize) -> Option<*const T> {
    let start = frame.start();
    let end = frame.end();

    if start + offset + mem::size_of::<T>() > end {
        return None;
    }

    Some((start + offset) as *const T)
}

/// Classify a frame as either an interesting TCP packet or uninteresting.
#[inline(always)]
pub fn classify<F: Frame + ?Sized>(frame: &F) -> Decision {
    let eth = match overlay::<F, EthHdr>(frame, 0) {
        Some(eth) => eth,
        None => return Decision::Uninteresting(Skip::ShortEthernet),
    };
    // SAFETY: overlay() proved the header lies inside the frame
    if unsafe { (*eth).ether_type() } != ETH_P_IP {
        return Decision::Uninteresting(Skip::NotIpv4);
    }

    let ip = match overlay::<F, Ipv4Hdr>(frame, IPV4_OFFSET) {
        Some(ip) => ip,
        None => return Decision::Uninteresting(Skip::ShortIpv4),
    };
    // SAFETY: as above
    if unsafe { (*ip).protocol } != IPPROTO_TCP {
        return Decision::Uninteresting(Skip::NotTcp);
    }

    let tcp = match overlay::<F, TcpHdr>(frame, TCP_OFFSET) {
        Some(tcp) => tcp,
        None => return Decision::Uninteresting(Skip::ShortTcp),
    };
    // SAFETY: as above
    let dest = unsafe { (*tcp).dest };

    Decision::TcpPacket(PortKey::from_wire(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::FrameBuilder;
    use crate::headers::MIN_TCP_FRAME_LEN;

    /// Exposes only the first `len` bytes of a longer backing buffer, so any
    /// read past `len` would see bytes that still look like valid headers.
    struct Window<'a> {
        bytes: &'a [u8],
        len: usize,
    }

    // SAFETY: `len` never exceeds `bytes.len()` in these tests
    unsafe impl Frame for Window<'_> {
        fn start(&self) -> usize {
            self.bytes.as_ptr() as usize
        }

        fn end(&self) -> usize {
            self.start() + self.len
        }
    }

    #[test]
    fn test_classify_tcp_443() {
        let frame = FrameBuilder::tcp(443).build();
        assert_eq!(frame.len(), MIN_TCP_FRAME_LEN);
        assert_eq!(
            classify(frame.as_slice()),
            Decision::TcpPacket(PortKey::from_port(443))
        );
    }

    #[test]
    fn test_classify_short_buffer() {
        let frame = [0u8; 10];
        assert_eq!(
            classify(&frame[..]),
            Decision::Uninteresting(Skip::ShortEthernet)
        );
        assert_eq!(
            classify(&[0u8; 0][..]),
            Decision::Uninteresting(Skip::ShortEthernet)
        );
    }

    #[test]
    fn test_classify_ipv6_ethertype() {
        let frame = FrameBuilder::tcp(80).ether_type(0x86dd).build();
        assert_eq!(
            classify(frame.as_slice()),
            Decision::Uninteresting(Skip::NotIpv4)
        );
    }

    #[test]
    fn test_classify_arp_and_vlan() {
        for ether_type in [0x0806, 0x8100] {
            let frame = FrameBuilder::tcp(80).ether_type(ether_type).build();
            assert_eq!(
                classify(frame.as_slice()),
                Decision::Uninteresting(Skip::NotIpv4)
            );
        }
    }

    #[test]
    fn test_classify_udp() {
        let frame = FrameBuilder::tcp(53).protocol(17).build();
        assert_eq!(
            classify(frame.as_slice()),
            Decision::Uninteresting(Skip::NotTcp)
        );
    }

    #[test]
    fn test_classify_partial_tcp_header() {
        // Ethernet and IPv4 are in-bounds, but the claimed total length only
        // leaves room for part of the TCP header.
        let frame = FrameBuilder::tcp(22).total_len(28).build();
        assert_eq!(
            classify(&frame[..TCP_OFFSET + 8]),
            Decision::Uninteresting(Skip::ShortTcp)
        );
    }

    #[test]
    fn test_classify_reads_destination_not_source() {
        let frame = FrameBuilder::tcp(5432).src_port(22).build();
        assert_eq!(
            classify(frame.as_slice()),
            Decision::TcpPacket(PortKey::from_port(5432))
        );
    }

    #[test]
    fn test_classify_with_payload() {
        let frame = FrameBuilder::tcp(8080).payload_len(1200).build();
        assert_eq!(
            classify(frame.as_slice()),
            Decision::TcpPacket(PortKey::from_port(8080))
        );
    }

    #[test]
    fn test_classify_ip_options_misread() {
        // Options are not parsed: the TCP header is read 20 bytes into the IP
        // header, which here lands on the option bytes.
        let frame = FrameBuilder::tcp(443).ip_options(&[0x01, 0x01, 0x01, 0x00]).build();
        assert_eq!(
            classify(frame.as_slice()),
            Decision::TcpPacket(PortKey::from_wire([0x01, 0x00]))
        );
    }

    #[test]
    fn test_truncation_never_reads_past_end() {
        let frame = FrameBuilder::tcp(443).payload_len(16).build();

        for len in 0..=frame.len() {
            let window = Window {
                bytes: &frame,
                len,
            };
            let decision = classify(&window);

            let expected = if len < EthHdr::LEN {
                Decision::Uninteresting(Skip::ShortEthernet)
            } else if len < TCP_OFFSET {
                Decision::Uninteresting(Skip::ShortIpv4)
            } else if len < MIN_TCP_FRAME_LEN {
                Decision::Uninteresting(Skip::ShortTcp)
            } else {
                Decision::TcpPacket(PortKey::from_port(443))
            };
            assert_eq!(decision, expected, "truncated at {} bytes", len);
        }
    }
}
