//! Frame header records and codec.
//!
//! Explicitly-typed Ethernet, IPv4 and UDP header records written back to
//! back into the headroom of a packet header. All multi-byte fields are
//! stored big-endian; `write_to`/`read_from` move whole records with pointer
//! copies, the same way WQE segments are emitted.
//!
//! The codec is idempotent and never reads previous header contents: frame
//! headers are regenerated from scratch on every send attempt because the
//! peer identity may differ between attempts.

use std::fmt;
use std::net::Ipv4Addr;

/// Ethernet header size in bytes.
pub const ETH_HDR_BYTES: usize = 14;

/// IPv4 header size in bytes (no options).
pub const IPV4_HDR_BYTES: usize = 20;

/// UDP header size in bytes.
pub const UDP_HDR_BYTES: usize = 8;

/// Headroom reserved in front of every packet for the frame headers.
pub const HEADROOM_BYTES: usize = ETH_HDR_BYTES + IPV4_HDR_BYTES + UDP_HDR_BYTES;

/// EtherType for IPv4.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// IP protocol number for UDP.
pub const IP_PROTO_UDP: u8 = 17;

/// Base UDP port; the source port is `BASE_UDP_PORT + rpc_id`.
pub const BASE_UDP_PORT: u16 = 31850;

/// Resolved peer addressing, produced by an external resolution collaborator.
///
/// Read-only to this subsystem; borrowed per `tx_burst` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingInfo {
    /// Peer MAC address.
    pub mac: [u8; 6],
    /// Peer IPv4 address.
    pub ipv4: Ipv4Addr,
    /// Peer UDP port.
    pub udp_port: u16,
}

/// Local addressing identity, fixed at transport setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoint {
    /// Local MAC address.
    pub mac: [u8; 6],
    /// Local IPv4 address.
    pub ipv4: Ipv4Addr,
    /// Local UDP source port.
    pub udp_port: u16,
}

impl LocalEndpoint {
    /// Build a local endpoint whose source port is derived from an RPC id.
    pub fn for_rpc_id(mac: [u8; 6], ipv4: Ipv4Addr, rpc_id: u8) -> Self {
        Self {
            mac,
            ipv4,
            udp_port: BASE_UDP_PORT + rpc_id as u16,
        }
    }
}

/// Ethernet header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct EthHdr {
    /// Destination MAC address.
    pub dst_mac: [u8; 6],
    /// Source MAC address.
    pub src_mac: [u8; 6],
    /// EtherType (big-endian).
    eth_type: u16,
}

impl EthHdr {
    /// Build an IPv4 Ethernet header.
    pub fn new(dst_mac: [u8; 6], src_mac: [u8; 6]) -> Self {
        Self {
            dst_mac,
            src_mac,
            eth_type: ETH_TYPE_IPV4.to_be(),
        }
    }

    /// Get the EtherType in host byte order.
    #[inline]
    pub fn eth_type(&self) -> u16 {
        u16::from_be(self.eth_type)
    }

    /// Write the header to raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `ETH_HDR_BYTES` writable bytes.
    #[inline]
    pub unsafe fn write_to(&self, dst: *mut u8) {
        unsafe {
            std::ptr::copy_nonoverlapping(self as *const Self as *const u8, dst, ETH_HDR_BYTES);
        }
    }

    /// Read a header from raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `ETH_HDR_BYTES` readable bytes.
    #[inline]
    pub unsafe fn read_from(src: *const u8) -> Self {
        unsafe {
            let mut hdr = std::mem::MaybeUninit::<Self>::uninit();
            std::ptr::copy_nonoverlapping(src, hdr.as_mut_ptr() as *mut u8, ETH_HDR_BYTES);
            hdr.assume_init()
        }
    }
}

impl fmt::Display for EthHdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_mac = |m: [u8; 6]| {
            format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                m[0], m[1], m[2], m[3], m[4], m[5]
            )
        };
        write!(
            f,
            "[eth dst {} src {} type {:#06x}]",
            fmt_mac(self.dst_mac),
            fmt_mac(self.src_mac),
            self.eth_type()
        )
    }
}

/// IPv4 header (no options).
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Ipv4Hdr {
    /// Version (4 bits) and IHL (4 bits).
    pub ver_ihl: u8,
    /// Type of service.
    pub tos: u8,
    /// Total length including IPv4 and UDP headers (big-endian).
    tot_len: u16,
    /// Identification (big-endian).
    id: u16,
    /// Flags and fragment offset (big-endian).
    frag_off: u16,
    /// Time to live.
    pub ttl: u8,
    /// Payload protocol.
    pub protocol: u8,
    /// Header checksum; zero, computed by hardware offload.
    pub check: u16,
    /// Source address (big-endian).
    saddr: u32,
    /// Destination address (big-endian).
    daddr: u32,
}

impl Ipv4Hdr {
    /// Build a UDP/IPv4 header carrying `len` bytes above the IP layer
    /// headers (i.e. RPC header plus payload).
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, len: usize) -> Self {
        Self {
            ver_ihl: 0x45,
            tos: 0,
            tot_len: ((IPV4_HDR_BYTES + UDP_HDR_BYTES + len) as u16).to_be(),
            id: 0,
            frag_off: 0,
            ttl: 128,
            protocol: IP_PROTO_UDP,
            check: 0,
            saddr: u32::from(src).to_be(),
            daddr: u32::from(dst).to_be(),
        }
    }

    /// Get the total length in host byte order.
    #[inline]
    pub fn tot_len(&self) -> usize {
        u16::from_be(self.tot_len) as usize
    }

    /// Get the source address.
    #[inline]
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.saddr))
    }

    /// Get the destination address.
    #[inline]
    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.daddr))
    }

    /// Write the header to raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `IPV4_HDR_BYTES` writable bytes.
    #[inline]
    pub unsafe fn write_to(&self, dst: *mut u8) {
        unsafe {
            std::ptr::copy_nonoverlapping(self as *const Self as *const u8, dst, IPV4_HDR_BYTES);
        }
    }

    /// Read a header from raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `IPV4_HDR_BYTES` readable bytes.
    #[inline]
    pub unsafe fn read_from(src: *const u8) -> Self {
        unsafe {
            let mut hdr = std::mem::MaybeUninit::<Self>::uninit();
            std::ptr::copy_nonoverlapping(src, hdr.as_mut_ptr() as *mut u8, IPV4_HDR_BYTES);
            hdr.assume_init()
        }
    }
}

impl fmt::Display for Ipv4Hdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ipv4 src {} dst {} len {}]",
            self.src(),
            self.dst(),
            self.tot_len()
        )
    }
}

/// UDP header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct UdpHdr {
    /// Source port (big-endian).
    src_port: u16,
    /// Destination port (big-endian).
    dst_port: u16,
    /// Length including the UDP header (big-endian).
    len: u16,
    /// Checksum; zero, computed by hardware offload.
    pub check: u16,
}

impl UdpHdr {
    /// Build a UDP header carrying `len` bytes of UDP payload
    /// (RPC header plus message payload).
    pub fn new(src_port: u16, dst_port: u16, len: usize) -> Self {
        Self {
            src_port: src_port.to_be(),
            dst_port: dst_port.to_be(),
            len: ((UDP_HDR_BYTES + len) as u16).to_be(),
            check: 0,
        }
    }

    /// Get the source port in host byte order.
    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be(self.src_port)
    }

    /// Get the destination port in host byte order.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be(self.dst_port)
    }

    /// Get the length field in host byte order.
    #[inline]
    pub fn len(&self) -> usize {
        u16::from_be(self.len) as usize
    }

    /// Write the header to raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `UDP_HDR_BYTES` writable bytes.
    #[inline]
    pub unsafe fn write_to(&self, dst: *mut u8) {
        unsafe {
            std::ptr::copy_nonoverlapping(self as *const Self as *const u8, dst, UDP_HDR_BYTES);
        }
    }

    /// Read a header from raw memory.
    ///
    /// # Safety
    /// The pointer must point to at least `UDP_HDR_BYTES` readable bytes.
    #[inline]
    pub unsafe fn read_from(src: *const u8) -> Self {
        unsafe {
            let mut hdr = std::mem::MaybeUninit::<Self>::uninit();
            std::ptr::copy_nonoverlapping(src, hdr.as_mut_ptr() as *mut u8, UDP_HDR_BYTES);
            hdr.assume_init()
        }
    }
}

impl fmt::Display for UdpHdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[udp src {} dst {} len {}]",
            self.src_port(),
            self.dst_port(),
            self.len()
        )
    }
}

/// Write the full Ethernet/IPv4/UDP frame header into a packet's headroom.
///
/// `len` is the byte count above the transport header: RPC header bytes plus
/// payload bytes. Pure in-place writes; no allocation.
pub fn write_frame_header(
    headroom: &mut [u8; HEADROOM_BYTES],
    local: &LocalEndpoint,
    peer: &RoutingInfo,
    len: usize,
) {
    let eth = EthHdr::new(peer.mac, local.mac);
    let ipv4 = Ipv4Hdr::new(local.ipv4, peer.ipv4, len);
    let udp = UdpHdr::new(local.udp_port, peer.udp_port, len);

    let ptr = headroom.as_mut_ptr();
    unsafe {
        eth.write_to(ptr);
        ipv4.write_to(ptr.add(ETH_HDR_BYTES));
        udp.write_to(ptr.add(ETH_HDR_BYTES + IPV4_HDR_BYTES));
    }
}

/// Parse the three frame headers out of a headroom region.
pub fn parse_frame_header(headroom: &[u8]) -> (EthHdr, Ipv4Hdr, UdpHdr) {
    assert!(headroom.len() >= HEADROOM_BYTES);
    let ptr = headroom.as_ptr();
    unsafe {
        (
            EthHdr::read_from(ptr),
            Ipv4Hdr::read_from(ptr.add(ETH_HDR_BYTES)),
            UdpHdr::read_from(ptr.add(ETH_HDR_BYTES + IPV4_HDR_BYTES)),
        )
    }
}

/// Render a headroom region's frame headers for trace logging.
pub fn frame_header_to_string(headroom: &[u8]) -> String {
    let (eth, ipv4, udp) = parse_frame_header(headroom);
    format!("{} {} {}", eth, ipv4, udp)
}
