//! The raw Ethernet transport datapath.
//!
//! [`RawTransport`] turns message buffers into hardware-ready packets and
//! drains completion state:
//!
//! - [`tx_burst`](RawTransport::tx_burst) segments a batch of message ranges
//!   into send descriptors, writes frame headers, and submits the batch with
//!   one chained doorbell.
//! - [`rx_burst`](RawTransport::rx_burst) reports how many new receive
//!   completions are visible, in O(1), without touching individual
//!   completion records.
//! - [`post_recvs`](RawTransport::post_recvs) batches receive buffer credits
//!   and reposts one multi-packet WQE per full stride.
//!
//! A transport instance is owned by a single data-plane thread; nothing here
//! is internally synchronized.

use tracing::{error, trace};

use crate::buffer::{MsgBuffer, RecvRing};
use crate::config::TransportConfig;
use crate::device::RawQp;
use crate::error::Result;
use crate::headers::{frame_header_to_string, write_frame_header, LocalEndpoint, RoutingInfo};
use crate::packet::{MAX_DATA_PER_PKT, PKT_HDR_SIZE, RPC_HDR_BYTES};
use crate::wire::{cqe_cycle_delta, CqeSnapshot, SendDescriptor, SendFlags, Sge};

/// One packet of a transmit batch: a byte range of a message buffer plus the
/// peer it is addressed to.
#[derive(Clone, Copy)]
pub struct TxBurstItem<'a> {
    /// The message buffer; may be a fake control buffer.
    pub msg_buffer: &'a MsgBuffer,
    /// Byte offset of this packet's payload within the message. Non-zero
    /// offsets must be multiples of [`MAX_DATA_PER_PKT`].
    pub offset: usize,
    /// Payload bytes carried by this packet; zero for control packets.
    pub data_bytes: usize,
    /// Resolved peer addressing.
    pub routing: &'a RoutingInfo,
}

/// Completion-signaling sampling policy.
///
/// Called once per posted descriptor, in order; descriptors for which it
/// returns true request a hardware completion. Sampling bounds completion
/// queue pressure while still detecting send queue backlog.
pub trait SignalPolicy {
    /// Whether the next posted descriptor should request a completion.
    fn should_signal(&mut self) -> bool;
}

/// Signal every `interval`-th descriptor, starting with the first.
pub struct IntervalSignal {
    interval: u32,
    count: u32,
}

impl IntervalSignal {
    /// Create a policy signaling every `interval`-th descriptor.
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    pub fn new(interval: u32) -> Self {
        assert!(interval > 0);
        Self { interval, count: 0 }
    }
}

impl SignalPolicy for IntervalSignal {
    fn should_signal(&mut self) -> bool {
        let signal = self.count % self.interval == 0;
        self.count = self.count.wrapping_add(1);
        signal
    }
}

/// The raw Ethernet transport datapath over one hardware queue pair.
pub struct RawTransport<D: RawQp> {
    /// The hardware queue pair.
    qp: D,
    /// Local addressing identity.
    local: LocalEndpoint,
    /// Pre-linked send descriptor ring; `sq_depth + 1` slots, the last one a
    /// never-posted sentinel so every postable slot has a successor.
    send_ring: Vec<SendDescriptor>,
    /// Completion signaling policy.
    signal: Box<dyn SignalPolicy>,
    /// Last observed completion cursor.
    prev_snapshot: CqeSnapshot,
    /// Current completion polling slot.
    cqe_idx: usize,
    /// Receive buffers owed to the hardware.
    recvs_to_post: usize,
    /// Next multi-packet WQE pool entry to post.
    mp_sge_idx: usize,
    /// Receive ring memory and SGE pool.
    recv_ring: RecvRing,
    /// Queue geometry.
    config: TransportConfig,
}

impl<D: RawQp> RawTransport<D> {
    /// Create a transport over an activated queue pair.
    pub fn new(qp: D, local: LocalEndpoint, config: TransportConfig) -> Result<Self> {
        config.validate()?;

        let mut send_ring = vec![SendDescriptor::default(); config.sq_depth + 1];
        for (i, desc) in send_ring.iter_mut().enumerate().take(config.sq_depth) {
            desc.next = Some(i + 1);
        }

        let recv_ring = RecvRing::new(
            config.rq_depth,
            config.strides_per_wqe,
            config.recv_slot_size,
        )?;

        let signal = Box::new(IntervalSignal::new(config.signal_interval));

        Ok(Self {
            qp,
            local,
            send_ring,
            signal,
            prev_snapshot: CqeSnapshot::default(),
            cqe_idx: 0,
            recvs_to_post: 0,
            mp_sge_idx: 0,
            recv_ring,
            config,
        })
    }

    /// Replace the completion signaling policy.
    pub fn set_signal_policy(&mut self, policy: Box<dyn SignalPolicy>) {
        self.signal = policy;
    }

    /// Transmit a batch of packets with one chained doorbell.
    ///
    /// First packets (offset zero) use one fragment spanning their header and
    /// payload, and are inlined when small enough. Continuation packets use
    /// two fragments (header, payload slice) and are never inlined. On
    /// return, every packet has been handed to the hardware; a submission
    /// failure is a sizing bug and terminates the process.
    ///
    /// # Panics
    /// Debug builds assert the caller contract: `items` is non-empty and at
    /// most `sq_depth` long, offsets and lengths lie within the message, and
    /// continuation offsets are multiples of [`MAX_DATA_PER_PKT`].
    pub fn tx_burst(&mut self, items: &[TxBurstItem<'_>]) {
        debug_assert!(!items.is_empty());
        debug_assert!(items.len() <= self.config.sq_depth);

        for (i, item) in items.iter().enumerate() {
            let msg_buffer = item.msg_buffer;
            debug_assert!(msg_buffer.is_valid()); // can be fake for control packets
            debug_assert!(item.data_bytes <= MAX_DATA_PER_PKT); // zero for control packets
            debug_assert!(item.offset + item.data_bytes <= msg_buffer.data_size());

            let desc = &mut self.send_ring[i];
            debug_assert_eq!(desc.next, Some(i + 1));

            desc.flags = if self.signal.should_signal() {
                SendFlags::SIGNALED
            } else {
                SendFlags::empty()
            };

            let pkt_idx;
            if item.offset == 0 {
                // First packet: header and payload are contiguous, one
                // fragment. Covers control packets with zero payload.
                pkt_idx = 0;
                desc.sgl[0] = Sge {
                    addr: msg_buffer.pkthdr_addr(0),
                    len: (PKT_HDR_SIZE + item.data_bytes) as u32,
                    lkey: 0,
                };
                desc.num_sge = 1;
                if desc.sgl[0].len as usize <= self.config.max_inline_data {
                    desc.flags |= SendFlags::INLINE;
                }
            } else {
                // Continuation packet: header fragment plus a payload slice
                // straight out of the message, no copy.
                debug_assert_eq!(item.offset % MAX_DATA_PER_PKT, 0);
                pkt_idx = item.offset / MAX_DATA_PER_PKT;
                desc.sgl[0] = Sge {
                    addr: msg_buffer.pkthdr_addr(pkt_idx),
                    len: PKT_HDR_SIZE as u32,
                    lkey: 0,
                };
                desc.sgl[1] = Sge {
                    addr: msg_buffer.data_addr() + item.offset as u64,
                    len: item.data_bytes as u32,
                    lkey: 0,
                };
                desc.num_sge = 2;
            }

            // Frame headers are regenerated per send; the peer may differ
            // between attempts.
            let headroom = unsafe { msg_buffer.headroom_mut(pkt_idx) };
            write_frame_header(
                headroom,
                &self.local,
                item.routing,
                RPC_HDR_BYTES + item.data_bytes,
            );

            if desc.num_sge == 1 {
                trace!(
                    sge_len = desc.sgl[0].len,
                    frame = %frame_header_to_string(&headroom[..]),
                    "sending message in one Ethernet frame"
                );
            }
        }

        let last = items.len() - 1;
        self.send_ring[last].next = None; // cut the chain at this batch
        if let Err(e) = self.qp.post_send_chain(&self.send_ring) {
            error!(error = %e, "fatal: send queue post failed");
            std::process::abort();
        }
        self.send_ring[last].next = Some(last + 1); // restore; sentinel makes +1 valid
    }

    /// Flush pending transmissions. A no-op: every batch is submitted
    /// immediately, nothing is buffered across calls.
    pub fn tx_flush(&mut self) {}

    /// Count newly visible receive completions.
    ///
    /// Returns 0 when the cursor has not moved, or when the computed
    /// distance is at or past the receive ring depth; such a distance means
    /// the polled slot holds stale or not-yet-visible data, never a
    /// legitimate batch.
    pub fn rx_burst(&mut self) -> usize {
        let cur = self.qp.snapshot_cqe(self.cqe_idx);
        let delta = cqe_cycle_delta(&self.prev_snapshot, &cur, self.config.strides_per_wqe);
        if delta == 0 || delta >= self.config.num_rx_ring_entries() {
            return 0;
        }

        self.cqe_idx = (self.cqe_idx + 1) % self.config.recv_cq_depth;
        self.prev_snapshot = cur;
        delta
    }

    /// Credit `num_recvs` receive buffers back to the hardware.
    ///
    /// Buffers are accumulated and posted one multi-packet WQE at a time:
    /// nothing touches the hardware until a full stride is owed, then exactly
    /// one pool entry is posted and one stride's worth of credits is
    /// consumed, keeping any remainder for the next stride.
    pub fn post_recvs(&mut self, num_recvs: usize) {
        self.recvs_to_post += num_recvs;
        if self.recvs_to_post < self.config.strides_per_wqe {
            return;
        }

        if let Err(e) = self.qp.post_mp_recv(self.recv_ring.mp_sge(self.mp_sge_idx)) {
            error!(error = %e, "fatal: receive queue post failed");
            std::process::abort();
        }
        self.mp_sge_idx = (self.mp_sge_idx + 1) % self.config.rq_depth;
        self.recvs_to_post -= self.config.strides_per_wqe;
    }

    /// The local addressing identity.
    pub fn local(&self) -> &LocalEndpoint {
        &self.local
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The send descriptor ring (including the trailing sentinel slot).
    pub fn send_ring(&self) -> &[SendDescriptor] {
        &self.send_ring
    }

    /// The receive ring.
    pub fn recv_ring(&self) -> &RecvRing {
        &self.recv_ring
    }

    /// Receive buffers currently owed to the hardware.
    pub fn recvs_to_post(&self) -> usize {
        self.recvs_to_post
    }

    /// The underlying queue pair.
    pub fn qp(&self) -> &D {
        &self.qp
    }

    /// The underlying queue pair, mutable.
    pub fn qp_mut(&mut self) -> &mut D {
        &mut self.qp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_signal_pattern() {
        let mut policy = IntervalSignal::new(4);
        let pattern: Vec<bool> = (0..8).map(|_| policy.should_signal()).collect();
        assert_eq!(
            pattern,
            vec![true, false, false, false, true, false, false, false]
        );
    }

    #[test]
    #[should_panic]
    fn test_interval_signal_zero() {
        IntervalSignal::new(0);
    }
}
