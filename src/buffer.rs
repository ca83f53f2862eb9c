//! Message buffers and the receive ring.
//!
//! A [`MsgBuffer`] holds one application message together with one
//! pre-reserved packet header per maximum-sized chunk, laid out so that the
//! first packet's header is contiguous with the first data chunk:
//!
//! ```text
//! [ PktHdr 0 | data (max_data_size bytes) | PktHdr 1 | PktHdr 2 | ... ]
//! ```
//!
//! Header 0 immediately precedes the data region, so a first packet is one
//! contiguous fragment. Headers 1..n live past the data region; continuation
//! packets reference their header and their payload slice as two fragments.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::headers::HEADROOM_BYTES;
use crate::packet::{num_pkts_for, PktHdr, MAX_DATA_PER_PKT, PKT_HDR_SIZE};
use crate::wire::Sge;

/// Alignment for message buffers (cache line aligned).
pub const MSG_BUFFER_ALIGN: usize = 64;

/// An application message plus its per-packet headers.
///
/// Owned by the caller; the transport borrows it only for the duration of a
/// `tx_burst` call and never retains it.
pub struct MsgBuffer {
    /// Start of the allocation; this is also packet header 0.
    ptr: NonNull<u8>,
    /// Total allocation size.
    capacity: usize,
    /// Size of the data region.
    max_data_size: usize,
    /// Current logical payload length.
    data_size: usize,
    /// Number of packet header slots (for `max_data_size`).
    max_num_pkts: usize,
    /// Header-only marker buffer for control packets.
    fake: bool,
}

impl MsgBuffer {
    /// Allocate a message buffer able to hold up to `max_data_size` payload
    /// bytes. The logical size starts at `max_data_size`; use
    /// [`set_data_size`](Self::set_data_size) to shrink it.
    pub fn new(max_data_size: usize) -> Result<Self> {
        if max_data_size == 0 {
            return Err(Error::InvalidConfig(
                "max_data_size cannot be 0; use MsgBuffer::control()".into(),
            ));
        }

        let max_num_pkts = num_pkts_for(max_data_size);
        let capacity = max_num_pkts * PKT_HDR_SIZE + max_data_size;
        let ptr = Self::alloc_bytes(capacity)?;

        Ok(Self {
            ptr,
            capacity,
            max_data_size,
            data_size: max_data_size,
            max_num_pkts,
            fake: false,
        })
    }

    /// Allocate a fake, header-only buffer used to carry a zero-payload
    /// control packet (credit return, request-for-response).
    pub fn control() -> Result<Self> {
        let ptr = Self::alloc_bytes(PKT_HDR_SIZE)?;
        Ok(Self {
            ptr,
            capacity: PKT_HDR_SIZE,
            max_data_size: 0,
            data_size: 0,
            max_num_pkts: 1,
            fake: true,
        })
    }

    fn alloc_bytes(capacity: usize) -> Result<NonNull<u8>> {
        let layout = Layout::from_size_align(capacity, MSG_BUFFER_ALIGN)
            .map_err(|_| Error::InvalidConfig("Invalid buffer layout".into()))?;

        unsafe {
            let ptr = alloc_zeroed(layout);
            if ptr.is_null() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    "Failed to allocate buffer",
                )));
            }
            Ok(NonNull::new_unchecked(ptr))
        }
    }

    /// Whether this buffer is usable for transmission.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.capacity >= PKT_HDR_SIZE
    }

    /// Whether this is a header-only control buffer.
    #[inline]
    pub fn is_fake(&self) -> bool {
        self.fake
    }

    /// Current logical payload length.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Maximum payload length this buffer can hold.
    #[inline]
    pub fn max_data_size(&self) -> usize {
        self.max_data_size
    }

    /// Shrink or grow the logical payload length within the allocation.
    ///
    /// # Panics
    /// Panics if `data_size > max_data_size`.
    #[inline]
    pub fn set_data_size(&mut self, data_size: usize) {
        assert!(data_size <= self.max_data_size);
        self.data_size = data_size;
    }

    /// Number of packets needed for the current logical size.
    #[inline]
    pub fn num_pkts(&self) -> usize {
        num_pkts_for(self.data_size)
    }

    #[inline]
    fn pkthdr_offset(&self, pkt_idx: usize) -> usize {
        debug_assert!(pkt_idx < self.max_num_pkts);
        if pkt_idx == 0 {
            0
        } else {
            PKT_HDR_SIZE + self.max_data_size + (pkt_idx - 1) * PKT_HDR_SIZE
        }
    }

    #[inline]
    fn pkthdr_ptr(&self, pkt_idx: usize) -> *mut u8 {
        unsafe { self.ptr.as_ptr().add(self.pkthdr_offset(pkt_idx)) }
    }

    /// Packet header `pkt_idx`.
    #[inline]
    pub fn pkthdr(&self, pkt_idx: usize) -> &PktHdr {
        unsafe { &*(self.pkthdr_ptr(pkt_idx) as *const PktHdr) }
    }

    /// Packet header `pkt_idx`, mutable.
    #[inline]
    pub fn pkthdr_mut(&mut self, pkt_idx: usize) -> &mut PktHdr {
        unsafe { &mut *(self.pkthdr_ptr(pkt_idx) as *mut PktHdr) }
    }

    /// Address of packet header `pkt_idx`, for scatter-gather entries.
    #[inline]
    pub fn pkthdr_addr(&self, pkt_idx: usize) -> u64 {
        self.pkthdr_ptr(pkt_idx) as u64
    }

    /// Address of the payload region, for scatter-gather entries.
    #[inline]
    pub fn data_addr(&self) -> u64 {
        unsafe { self.ptr.as_ptr().add(PKT_HDR_SIZE) as u64 }
    }

    /// Payload bytes for the current logical size.
    #[inline]
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data_addr() as *const u8, self.data_size) }
    }

    /// Payload bytes, mutable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data_addr() as *mut u8, self.data_size) }
    }

    /// Frame headroom of packet header `pkt_idx`, writable through a shared
    /// borrow.
    ///
    /// # Safety
    /// The caller owns the transport thread and must not hold any other
    /// reference overlapping this header while the returned slice is alive.
    /// The datapath uses this to regenerate frame headers on buffers it only
    /// borrows, mirroring single-threaded queue ownership.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn headroom_mut(&self, pkt_idx: usize) -> &mut [u8; HEADROOM_BYTES] {
        unsafe { &mut *(self.pkthdr_ptr(pkt_idx) as *mut [u8; HEADROOM_BYTES]) }
    }
}

impl Drop for MsgBuffer {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.capacity, MSG_BUFFER_ALIGN).unwrap();
        unsafe {
            dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

// MsgBuffer owns its allocation.
unsafe impl Send for MsgBuffer {}

/// Page size alignment for the receive ring.
pub const PAGE_SIZE: usize = 4096;

/// The receive-side buffer ring plus its multi-packet SGE pool.
///
/// One contiguous page-aligned allocation of `rq_depth * strides_per_wqe`
/// slots. Pool entry `i` is a pre-sized scatter-gather entry covering the
/// `strides_per_wqe` consecutive slots of WQE `i`; replenishment posts one
/// pool entry at a time.
pub struct RecvRing {
    /// Ring base address.
    buf: *mut u8,
    /// Size of one receive slot.
    slot_size: usize,
    /// Total number of slots.
    num_entries: usize,
    /// One SGE per multi-packet WQE, fixed at setup.
    mp_sges: Vec<Sge>,
}

impl RecvRing {
    /// Allocate the ring and precompute the multi-packet SGE pool.
    pub fn new(rq_depth: usize, strides_per_wqe: usize, slot_size: usize) -> Result<Self> {
        if rq_depth == 0 || strides_per_wqe == 0 {
            return Err(Error::InvalidConfig("receive ring cannot be empty".into()));
        }
        if slot_size < PKT_HDR_SIZE + MAX_DATA_PER_PKT {
            return Err(Error::InvalidConfig(format!(
                "recv slot size {} cannot hold a full packet",
                slot_size
            )));
        }

        let num_entries = rq_depth * strides_per_wqe;
        let ring_bytes = num_entries * slot_size;

        let buf = unsafe {
            let mut ptr: *mut libc::c_void = std::ptr::null_mut();
            let ret = libc::posix_memalign(&mut ptr, PAGE_SIZE, ring_bytes);
            if ret != 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    format!("posix_memalign failed: {}", ret),
                )));
            }
            std::ptr::write_bytes(ptr as *mut u8, 0, ring_bytes);
            ptr as *mut u8
        };

        let wqe_bytes = strides_per_wqe * slot_size;
        let mp_sges = (0..rq_depth)
            .map(|i| Sge {
                addr: buf as u64 + (i * wqe_bytes) as u64,
                len: wqe_bytes as u32,
                lkey: 0,
            })
            .collect();

        Ok(Self {
            buf,
            slot_size,
            num_entries,
            mp_sges,
        })
    }

    /// The pre-sized SGE for multi-packet WQE `idx`.
    #[inline]
    pub fn mp_sge(&self, idx: usize) -> &Sge {
        &self.mp_sges[idx]
    }

    /// Number of multi-packet WQE pool entries.
    #[inline]
    pub fn num_wqes(&self) -> usize {
        self.mp_sges.len()
    }

    /// Total number of receive slots.
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Size of one receive slot.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Bytes of receive slot `idx`.
    ///
    /// The hardware writes into slots asynchronously; callers read a slot
    /// only after `rx_burst` has reported it complete.
    #[inline]
    pub fn slot(&self, idx: usize) -> &[u8] {
        debug_assert!(idx < self.num_entries);
        unsafe {
            std::slice::from_raw_parts(self.buf.add(idx * self.slot_size), self.slot_size)
        }
    }
}

impl Drop for RecvRing {
    fn drop(&mut self) {
        unsafe {
            libc::free(self.buf as *mut libc::c_void);
        }
    }
}

// RecvRing owns its allocation.
unsafe impl Send for RecvRing {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_buffer_layout() {
        let buf = MsgBuffer::new(3000).unwrap();
        assert!(buf.is_valid());
        assert!(!buf.is_fake());
        assert_eq!(buf.data_size(), 3000);
        assert_eq!(buf.num_pkts(), 3);

        // Header 0 is contiguous with the data region.
        assert_eq!(buf.pkthdr_addr(0) + PKT_HDR_SIZE as u64, buf.data_addr());
        // Trailing headers sit past the data region, one after another.
        assert_eq!(buf.pkthdr_addr(1), buf.data_addr() + 3000);
        assert_eq!(buf.pkthdr_addr(2), buf.pkthdr_addr(1) + PKT_HDR_SIZE as u64);
        // Cache line alignment.
        assert_eq!(buf.pkthdr_addr(0) % MSG_BUFFER_ALIGN as u64, 0);
    }

    #[test]
    fn test_msg_buffer_resize() {
        let mut buf = MsgBuffer::new(4096).unwrap();
        assert_eq!(buf.num_pkts(), 4);
        buf.set_data_size(100);
        assert_eq!(buf.data_size(), 100);
        assert_eq!(buf.num_pkts(), 1);
        assert_eq!(buf.data().len(), 100);
    }

    #[test]
    fn test_control_buffer() {
        let buf = MsgBuffer::control().unwrap();
        assert!(buf.is_valid());
        assert!(buf.is_fake());
        assert_eq!(buf.data_size(), 0);
        assert_eq!(buf.num_pkts(), 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(MsgBuffer::new(0).is_err());
    }

    #[test]
    fn test_recv_ring_sge_pool() {
        let ring = RecvRing::new(4, 8, 2048).unwrap();
        assert_eq!(ring.num_wqes(), 4);
        assert_eq!(ring.num_entries(), 32);

        let wqe_bytes = 8 * 2048;
        for i in 0..4 {
            let sge = ring.mp_sge(i);
            assert_eq!(sge.len as usize, wqe_bytes);
            assert_eq!(sge.lkey, 0);
            assert_eq!(sge.addr, ring.mp_sge(0).addr + (i * wqe_bytes) as u64);
        }
        assert_eq!(ring.mp_sge(0).addr % PAGE_SIZE as u64, 0);
    }
}
