//! The hardware queue-pair seam.
//!
//! [`RawQp`] is the boundary between the datapath and the NIC: one chained
//! doorbell per send batch, one multi-packet buffer post per replenishment
//! stride, and one completion cursor read per poll. Queue creation,
//! activation and teardown belong to the owning process, not to this layer.

use std::io;

use crate::wire::{CqeSnapshot, SendDescriptor, Sge};

/// Hardware send/receive queue pair interface.
///
/// Implementations are not required to be thread-safe: a transport instance
/// and its queue pair are owned by a single data-plane thread.
pub trait RawQp {
    /// Submit a chained batch of send descriptors with one doorbell.
    ///
    /// The chain starts at `ring[0]` and follows `next` links until a slot
    /// with `next == None`. Descriptors past the chain cut must not be read.
    fn post_send_chain(&mut self, ring: &[SendDescriptor]) -> io::Result<()>;

    /// Post one multi-packet receive WQE covering the buffers behind `sge`.
    fn post_mp_recv(&mut self, sge: &Sge) -> io::Result<()>;

    /// Read the completion cursor visible at one polling slot.
    ///
    /// Never blocks; the returned snapshot may be stale or torn, which the
    /// caller filters through cycle-delta range checks.
    fn snapshot_cqe(&self, slot: usize) -> CqeSnapshot;
}
