//! Send descriptor ring elements and completion cursor arithmetic.

use bitflags::bitflags;

/// One scatter-gather entry: a contiguous memory region referenced by a
/// hardware descriptor.
///
/// The raw transport does not register memory, so `lkey` is always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sge {
    /// Fragment start address.
    pub addr: u64,
    /// Fragment length in bytes.
    pub len: u32,
    /// Local memory key (zero for the raw transport).
    pub lkey: u32,
}

bitflags! {
    /// Send descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SendFlags: u8 {
        /// Request a hardware completion for this descriptor.
        const SIGNALED = 1 << 0;
        /// Copy the fragment into the descriptor instead of DMA'ing it.
        /// Only valid for single-fragment descriptors.
        const INLINE = 1 << 1;
    }
}

/// Maximum scatter-gather entries per send descriptor.
pub const MAX_SGE_PER_DESC: usize = 2;

/// One hardware send descriptor slot.
///
/// Descriptors live in a fixed ring pre-linked through `next` indices so a
/// contiguous sub-range can be posted as one chained submission. Outside a
/// post, slot `i`'s `next` is always `Some(i + 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendDescriptor {
    /// Scatter-gather list; `num_sge` entries are valid.
    pub sgl: [Sge; MAX_SGE_PER_DESC],
    /// Number of valid scatter-gather entries.
    pub num_sge: usize,
    /// Descriptor flags.
    pub flags: SendFlags,
    /// Next slot in the chain, or `None` at the end of a posted batch.
    pub next: Option<usize>,
}

/// Snapshot of the hardware completion cursor: the WQE index and the stride
/// counter of the most recent completion visible in a polling slot.
///
/// Both fields are 16-bit hardware counters that wrap; distances between
/// snapshots are computed over the combined cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CqeSnapshot {
    /// Multi-packet WQE index counter.
    pub wqe_id: u16,
    /// Stride counter within the WQE.
    pub wqe_counter: u16,
}

impl CqeSnapshot {
    /// Position of this snapshot on the combined stride cycle.
    #[inline]
    pub fn cycle_idx(&self, strides_per_wqe: usize) -> usize {
        self.wqe_id as usize * strides_per_wqe + self.wqe_counter as usize
    }

    /// Build the snapshot whose cycle position is `idx`.
    #[inline]
    pub fn from_cycle_idx(idx: usize, strides_per_wqe: usize) -> Self {
        let idx = idx % snapshot_cycle(strides_per_wqe);
        Self {
            wqe_id: (idx / strides_per_wqe) as u16,
            wqe_counter: (idx % strides_per_wqe) as u16,
        }
    }
}

/// Length of the combined snapshot cycle: 16-bit WQE ids times strides.
#[inline]
pub fn snapshot_cycle(strides_per_wqe: usize) -> usize {
    (1usize << 16) * strides_per_wqe
}

/// Forward wraparound distance from `prev` to `cur` on the snapshot cycle.
///
/// The result is in `[0, cycle)`; callers treat zero and anything at or
/// above the receive ring depth as "no new completions".
#[inline]
pub fn cqe_cycle_delta(prev: &CqeSnapshot, cur: &CqeSnapshot, strides_per_wqe: usize) -> usize {
    let cycle = snapshot_cycle(strides_per_wqe);
    let from = prev.cycle_idx(strides_per_wqe) % cycle;
    let to = cur.cycle_idx(strides_per_wqe) % cycle;
    ((to + cycle) - from) % cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDES: usize = 512;

    #[test]
    fn test_cycle_idx_roundtrip() {
        for idx in [0usize, 1, 511, 512, 513, 12345, snapshot_cycle(STRIDES) - 1] {
            let snap = CqeSnapshot::from_cycle_idx(idx, STRIDES);
            assert_eq!(snap.cycle_idx(STRIDES), idx);
        }
    }

    #[test]
    fn test_cycle_delta_forward() {
        let a = CqeSnapshot::from_cycle_idx(100, STRIDES);
        let b = CqeSnapshot::from_cycle_idx(107, STRIDES);
        assert_eq!(cqe_cycle_delta(&a, &b, STRIDES), 7);
        assert_eq!(cqe_cycle_delta(&a, &a, STRIDES), 0);
    }

    #[test]
    fn test_cycle_delta_wraparound() {
        // Crossing the 16-bit wqe_id wrap must still give a small delta.
        let cycle = snapshot_cycle(STRIDES);
        let a = CqeSnapshot::from_cycle_idx(cycle - 2, STRIDES);
        let b = CqeSnapshot::from_cycle_idx(1, STRIDES);
        assert_eq!(cqe_cycle_delta(&a, &b, STRIDES), 3);
        // Backward movement shows up as a huge forward distance, which the
        // caller rejects as out of range.
        assert_eq!(cqe_cycle_delta(&b, &a, STRIDES), cycle - 3);
    }

    #[test]
    fn test_send_descriptor_default() {
        let desc = SendDescriptor::default();
        assert_eq!(desc.num_sge, 0);
        assert_eq!(desc.flags, SendFlags::empty());
        assert_eq!(desc.next, None);
    }
}
