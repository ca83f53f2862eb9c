//! Per-packet header layout and wire constants.
//!
//! Every wire packet starts with a [`PktHdr`]: a headroom region that the
//! datapath fills with Ethernet/IPv4/UDP headers at send time, followed by
//! the RPC header fields that the upper layer fills when it prepares a
//! message. The headroom is regenerated on every send attempt; the RPC
//! fields are written once per message.

use crate::error::{Error, Result};
use crate::headers::HEADROOM_BYTES;

/// RPC header size in bytes (the protocol header, excluding headroom).
pub const RPC_HDR_BYTES: usize = 16;

/// Total per-packet header size: frame headroom plus RPC header.
pub const PKT_HDR_SIZE: usize = HEADROOM_BYTES + RPC_HDR_BYTES;

/// Maximum payload bytes carried by one wire packet.
pub const MAX_DATA_PER_PKT: usize = 1024;

/// Magic number for valid packet headers.
pub const PKT_HDR_MAGIC: u8 = 0xEC;

/// Maximum message size (24 bits).
pub const MAX_MSG_SIZE: usize = (1 << 24) - 1;

/// Maximum packet number (14 bits).
pub const MAX_PKT_NUM: u16 = (1 << 14) - 1;

/// Maximum request number (44 bits).
pub const MAX_REQ_NUM: u64 = (1 << 44) - 1;

/// Number of packets needed to carry `data_size` payload bytes.
///
/// Zero-byte messages (control packets) still occupy one packet.
#[inline]
pub fn num_pkts_for(data_size: usize) -> usize {
    if data_size == 0 {
        1
    } else {
        data_size.div_ceil(MAX_DATA_PER_PKT)
    }
}

/// Packet type (2 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PktType {
    /// Request packet (first or middle packet of a request).
    Req = 0,
    /// Request-for-response (control packet, no payload).
    ReqForResp = 1,
    /// Response packet.
    Resp = 2,
    /// Explicit credit return (control packet, no payload).
    CreditReturn = 3,
}

impl TryFrom<u8> for PktType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PktType::Req),
            1 => Ok(PktType::ReqForResp),
            2 => Ok(PktType::Resp),
            3 => Ok(PktType::CreditReturn),
            _ => Err(Error::InvalidPacketType(value)),
        }
    }
}

/// Per-packet header.
///
/// Layout (after the headroom):
/// ```text
/// Offset  Size  Field
/// 0       1     req_type
/// 1       3     msg_size (24-bit)
/// 4       2     dest_session_num
/// 6       2     pkt_type (2 bits) + pkt_num (14 bits)
/// 8       6     req_num (44 bits)
/// 14      1     reserved
/// 15      1     magic
/// ```
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct PktHdr {
    /// Space for the Ethernet, IPv4 and UDP headers, written at send time.
    headroom: [u8; HEADROOM_BYTES],
    /// Request type (application-defined).
    req_type: u8,
    /// Message size in bytes (24 bits, little-endian).
    msg_size_bytes: [u8; 3],
    /// Destination session number.
    dest_session_num: u16,
    /// Packet type (2 bits) and packet number (14 bits).
    pkt_type_num: u16,
    /// Request number (44 bits stored in 6 bytes).
    req_num_bytes: [u8; 6],
    /// Reserved byte.
    reserved: u8,
    /// Magic number for validation.
    magic: u8,
}

impl PktHdr {
    /// Create a new packet header with zeroed headroom.
    pub fn new(
        req_type: u8,
        msg_size: usize,
        dest_session_num: u16,
        pkt_type: PktType,
        pkt_num: u16,
        req_num: u64,
    ) -> Self {
        debug_assert!(msg_size <= MAX_MSG_SIZE);
        debug_assert!(pkt_num <= MAX_PKT_NUM);
        debug_assert!(req_num <= MAX_REQ_NUM);

        let mut hdr = Self {
            headroom: [0; HEADROOM_BYTES],
            req_type,
            msg_size_bytes: [0; 3],
            dest_session_num,
            pkt_type_num: 0,
            req_num_bytes: [0; 6],
            reserved: 0,
            magic: PKT_HDR_MAGIC,
        };

        hdr.set_msg_size(msg_size);
        hdr.set_pkt_type_num(pkt_type, pkt_num);
        hdr.set_req_num(req_num);

        hdr
    }

    /// Get the frame headroom.
    #[inline]
    pub fn headroom(&self) -> &[u8; HEADROOM_BYTES] {
        &self.headroom
    }

    /// Get the request type.
    #[inline]
    pub fn req_type(&self) -> u8 {
        self.req_type
    }

    /// Get the message size.
    #[inline]
    pub fn msg_size(&self) -> usize {
        (self.msg_size_bytes[0] as usize)
            | ((self.msg_size_bytes[1] as usize) << 8)
            | ((self.msg_size_bytes[2] as usize) << 16)
    }

    #[inline]
    fn set_msg_size(&mut self, size: usize) {
        self.msg_size_bytes[0] = (size & 0xFF) as u8;
        self.msg_size_bytes[1] = ((size >> 8) & 0xFF) as u8;
        self.msg_size_bytes[2] = ((size >> 16) & 0xFF) as u8;
    }

    /// Get the destination session number.
    #[inline]
    pub fn dest_session_num(&self) -> u16 {
        self.dest_session_num
    }

    /// Get the packet type.
    #[inline]
    pub fn pkt_type(&self) -> PktType {
        match (self.pkt_type_num >> 14) & 0x03 {
            0 => PktType::Req,
            1 => PktType::ReqForResp,
            2 => PktType::Resp,
            _ => PktType::CreditReturn,
        }
    }

    /// Get the packet number.
    #[inline]
    pub fn pkt_num(&self) -> u16 {
        self.pkt_type_num & MAX_PKT_NUM
    }

    #[inline]
    fn set_pkt_type_num(&mut self, pkt_type: PktType, pkt_num: u16) {
        self.pkt_type_num = ((pkt_type as u16) << 14) | (pkt_num & MAX_PKT_NUM);
    }

    /// Get the request number.
    #[inline]
    pub fn req_num(&self) -> u64 {
        (self.req_num_bytes[0] as u64)
            | ((self.req_num_bytes[1] as u64) << 8)
            | ((self.req_num_bytes[2] as u64) << 16)
            | ((self.req_num_bytes[3] as u64) << 24)
            | ((self.req_num_bytes[4] as u64) << 32)
            | (((self.req_num_bytes[5] & 0x0F) as u64) << 40)
    }

    #[inline]
    fn set_req_num(&mut self, req_num: u64) {
        self.req_num_bytes[0] = (req_num & 0xFF) as u8;
        self.req_num_bytes[1] = ((req_num >> 8) & 0xFF) as u8;
        self.req_num_bytes[2] = ((req_num >> 16) & 0xFF) as u8;
        self.req_num_bytes[3] = ((req_num >> 24) & 0xFF) as u8;
        self.req_num_bytes[4] = ((req_num >> 32) & 0xFF) as u8;
        self.req_num_bytes[5] = ((req_num >> 40) & 0x0F) as u8;
    }

    /// Check if this is a zero-payload control packet type.
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self.pkt_type(), PktType::ReqForResp | PktType::CreditReturn)
    }

    /// Check if the magic number is valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        let magic = self.magic;
        magic == PKT_HDR_MAGIC
    }

    /// Validate the packet header.
    pub fn validate(&self) -> Result<()> {
        let magic = self.magic;
        if magic != PKT_HDR_MAGIC {
            return Err(Error::InvalidMagic {
                expected: PKT_HDR_MAGIC,
                got: magic,
            });
        }
        Ok(())
    }

    /// Deserialize a header from raw memory.
    ///
    /// # Safety
    /// The source buffer must be at least `PKT_HDR_SIZE` bytes.
    #[inline]
    pub unsafe fn read_from(src: *const u8) -> Self {
        unsafe {
            let mut hdr = std::mem::MaybeUninit::<Self>::uninit();
            std::ptr::copy_nonoverlapping(src, hdr.as_mut_ptr() as *mut u8, PKT_HDR_SIZE);
            hdr.assume_init()
        }
    }

    /// Create a header from a byte slice, validating the magic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PKT_HDR_SIZE {
            return Err(Error::BufferTooSmall {
                required: PKT_HDR_SIZE,
                available: bytes.len(),
            });
        }
        let hdr = unsafe { Self::read_from(bytes.as_ptr()) };
        hdr.validate()?;
        Ok(hdr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkt_hdr_size() {
        assert_eq!(std::mem::size_of::<PktHdr>(), PKT_HDR_SIZE);
        assert_eq!(PKT_HDR_SIZE, HEADROOM_BYTES + RPC_HDR_BYTES);
    }

    #[test]
    fn test_pkt_hdr_fields() {
        let hdr = PktHdr::new(42, 0x123456, 0x1234, PktType::Req, 0x3FFF, 0x0FFF_FFFF_FFFF);

        assert_eq!(hdr.req_type(), 42);
        assert_eq!(hdr.msg_size(), 0x123456);
        assert_eq!(hdr.dest_session_num(), 0x1234);
        assert_eq!(hdr.pkt_type(), PktType::Req);
        assert_eq!(hdr.pkt_num(), 0x3FFF);
        assert_eq!(hdr.req_num(), 0x0FFF_FFFF_FFFF);
        assert!(hdr.is_valid());
    }

    #[test]
    fn test_pkt_types() {
        for pkt_type in [
            PktType::Req,
            PktType::ReqForResp,
            PktType::Resp,
            PktType::CreditReturn,
        ] {
            let hdr = PktHdr::new(0, 0, 0, pkt_type, 0, 0);
            assert_eq!(hdr.pkt_type(), pkt_type);
            assert_eq!(PktType::try_from(pkt_type as u8).unwrap(), pkt_type);
        }
        assert!(PktType::try_from(4).is_err());
    }

    #[test]
    fn test_from_bytes_rejects_bad_magic() {
        let bytes = [0u8; PKT_HDR_SIZE];
        assert!(matches!(
            PktHdr::from_bytes(&bytes),
            Err(Error::InvalidMagic { .. })
        ));
        assert!(matches!(
            PktHdr::from_bytes(&bytes[..4]),
            Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_num_pkts_for() {
        assert_eq!(num_pkts_for(0), 1);
        assert_eq!(num_pkts_for(1), 1);
        assert_eq!(num_pkts_for(MAX_DATA_PER_PKT), 1);
        assert_eq!(num_pkts_for(MAX_DATA_PER_PKT + 1), 2);
        assert_eq!(num_pkts_for(3 * MAX_DATA_PER_PKT), 3);
        assert_eq!(num_pkts_for(3 * MAX_DATA_PER_PKT + 1), 4);
    }
}
