//! Test utilities for datapath tests and benchmarks.
//!
//! [`MockQp`] stands in for the hardware queue pair: it captures posted
//! frames by copying bytes out of the scatter-gather entries, counts
//! doorbells and multi-packet posts, and serves test-controlled completion
//! snapshots.

use std::io;

use crate::config::TransportConfig;
use crate::device::RawQp;
use crate::packet::PKT_HDR_SIZE;
use crate::wire::{CqeSnapshot, SendDescriptor, SendFlags, Sge};

/// One descriptor captured by [`MockQp::post_send_chain`].
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// Whether the descriptor requested a completion.
    pub signaled: bool,
    /// Whether the descriptor was marked for inlining.
    pub inlined: bool,
    /// Fragment bytes, one entry per scatter-gather entry.
    pub frags: Vec<Vec<u8>>,
}

impl CapturedPacket {
    /// Number of fragments.
    pub fn num_frags(&self) -> usize {
        self.frags.len()
    }

    /// All wire bytes, fragments concatenated in order.
    pub fn bytes(&self) -> Vec<u8> {
        self.frags.concat()
    }

    /// Payload bytes: everything past the packet header. Fragment 0 always
    /// begins with the full packet header, so this works for both single-
    /// and two-fragment packets.
    pub fn payload(&self) -> Vec<u8> {
        let bytes = self.bytes();
        bytes[PKT_HDR_SIZE..].to_vec()
    }
}

/// In-memory queue pair for tests.
pub struct MockQp {
    /// Every descriptor posted, in submission order across all doorbells.
    pub sent: Vec<CapturedPacket>,
    /// Number of chained send submissions.
    pub doorbells: usize,
    /// Every multi-packet receive post, in order.
    pub mp_posts: Vec<Sge>,
    /// Per-polling-slot completion snapshots.
    snapshots: Vec<CqeSnapshot>,
    strides_per_wqe: usize,
}

impl MockQp {
    /// Create a mock with `recv_cq_depth` polling slots.
    pub fn new(recv_cq_depth: usize, strides_per_wqe: usize) -> Self {
        Self {
            sent: Vec::new(),
            doorbells: 0,
            mp_posts: Vec::new(),
            snapshots: vec![CqeSnapshot::default(); recv_cq_depth],
            strides_per_wqe,
        }
    }

    /// Create a mock matching a transport configuration.
    pub fn for_config(config: &TransportConfig) -> Self {
        Self::new(config.recv_cq_depth, config.strides_per_wqe)
    }

    /// Make `idx` the cursor position visible in every polling slot, as if
    /// the hardware had progressed to that point.
    pub fn set_cycle_idx(&mut self, idx: usize) {
        let snap = CqeSnapshot::from_cycle_idx(idx, self.strides_per_wqe);
        for slot in &mut self.snapshots {
            *slot = snap;
        }
    }

    /// Override the snapshot of a single polling slot.
    pub fn set_slot_snapshot(&mut self, slot: usize, snap: CqeSnapshot) {
        self.snapshots[slot] = snap;
    }
}

impl RawQp for MockQp {
    fn post_send_chain(&mut self, ring: &[SendDescriptor]) -> io::Result<()> {
        self.doorbells += 1;

        let mut idx = 0;
        loop {
            assert!(idx < ring.len(), "chain ran past the descriptor ring");
            let desc = &ring[idx];
            assert!(desc.num_sge >= 1 && desc.num_sge <= desc.sgl.len());

            let frags = desc.sgl[..desc.num_sge]
                .iter()
                .map(|sge| {
                    unsafe {
                        std::slice::from_raw_parts(sge.addr as *const u8, sge.len as usize)
                    }
                    .to_vec()
                })
                .collect();

            self.sent.push(CapturedPacket {
                signaled: desc.flags.contains(SendFlags::SIGNALED),
                inlined: desc.flags.contains(SendFlags::INLINE),
                frags,
            });

            match desc.next {
                Some(next) => idx = next,
                None => break,
            }
        }

        Ok(())
    }

    fn post_mp_recv(&mut self, sge: &Sge) -> io::Result<()> {
        self.mp_posts.push(*sge);
        Ok(())
    }

    fn snapshot_cqe(&self, slot: usize) -> CqeSnapshot {
        self.snapshots[slot]
    }
}
