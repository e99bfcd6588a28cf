//! Synthetic Ethernet/IPv4/TCP frames for tests and benchmarks

use crate::headers::{EthHdr, Ipv4Hdr, TcpHdr, ETH_P_IP, IPPROTO_TCP};

/// Builds a raw frame byte by byte.
///
/// Defaults to a well-formed Ethernet + IPv4 (no options) + TCP frame with
/// no payload and a consistent IPv4 total length.
#[derive(Clone, Debug)]
pub struct FrameBuilder {
    ether_type: u16,
    protocol: u8,
    src_port: u16,
    dst_port: u16,
    ip_options: Vec<u8>,
    total_len: Option<u16>,
    payload_len: usize,
}

impl FrameBuilder {
    pub fn tcp(dst_port: u16) -> Self {
        Self {
            ether_type: ETH_P_IP,
            protocol: IPPROTO_TCP,
            src_port: 49152,
            dst_port,
            ip_options: Vec::new(),
            total_len: None,
            payload_len: 0,
        }
    }

    pub fn ether_type(mut self, ether_type: u16) -> Self {
        self.ether_type = ether_type;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_port(mut self, src_port: u16) -> Self {
        self.src_port = src_port;
        self
    }

    /// IPv4 options, padded to a multiple of four bytes
    pub fn ip_options(mut self, options: &[u8]) -> Self {
        self.ip_options = options.to_vec();
        while self.ip_options.len() % 4 != 0 {
            self.ip_options.push(0);
        }
        self
    }

    /// Override the IPv4 total length field
    pub fn total_len(mut self, total_len: u16) -> Self {
        self.total_len = Some(total_len);
        self
    }

    pub fn payload_len(mut self, payload_len: usize) -> Self {
        self.payload_len = payload_len;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ip_header_len = Ipv4Hdr::LEN + self.ip_options.len();
        let mut frame =
            Vec::with_capacity(EthHdr::LEN + ip_header_len + TcpHdr::LEN + self.payload_len);

        // Ethernet
        frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
        frame.extend_from_slice(&self.ether_type.to_be_bytes());

        // IPv4
        let total_len = self
            .total_len
            .unwrap_or((ip_header_len + TcpHdr::LEN + self.payload_len) as u16);
        frame.push(0x40 | (ip_header_len / 4) as u8);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x01]);
        frame.extend_from_slice(&[0x40, 0x00]);
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&[10, 0, 0, 1]);
        frame.extend_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&self.ip_options);

        // TCP
        frame.extend_from_slice(&self.src_port.to_be_bytes());
        frame.extend_from_slice(&self.dst_port.to_be_bytes());
        frame.extend_from_slice(&1u32.to_be_bytes());
        frame.extend_from_slice(&0u32.to_be_bytes());
        frame.extend_from_slice(&[0x50, 0x02]);
        frame.extend_from_slice(&[0xff, 0xff]);
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&[0x00, 0x00]);

        frame.resize(frame.len() + self.payload_len, 0xab);
        frame
    }
}
