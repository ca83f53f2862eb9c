//! Configuration types for the raw Ethernet transport.

use crate::error::{Error, Result};
use crate::packet::{MAX_DATA_PER_PKT, PKT_HDR_SIZE};

/// Transport configuration.
///
/// Queue geometry and datapath tuning parameters. These are fixed once at
/// setup time; the datapath never re-reads them from the outside.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Send descriptor ring capacity (maximum `tx_burst` batch size).
    /// Default: 128
    pub sq_depth: usize,
    /// Number of multi-packet receive WQE pool entries.
    /// Default: 4
    pub rq_depth: usize,
    /// Number of packet strides backed by one multi-packet receive WQE.
    /// Replenishment is posted once this many buffers are owed.
    /// Default: 512
    pub strides_per_wqe: usize,
    /// Number of receive completion polling slots.
    /// Default: 8
    pub recv_cq_depth: usize,
    /// Size of one receive ring slot in bytes. Must hold a full packet.
    /// Default: 2048
    pub recv_slot_size: usize,
    /// Maximum number of bytes eligible for descriptor inlining.
    /// Default: 120
    pub max_inline_data: usize,
    /// Default completion sampling interval: every Nth send descriptor
    /// requests a hardware completion.
    /// Default: 64
    pub signal_interval: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sq_depth: 128,
            rq_depth: 4,
            strides_per_wqe: 512,
            recv_cq_depth: 8,
            recv_slot_size: 2048,
            max_inline_data: 120,
            signal_interval: 64,
        }
    }
}

impl TransportConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of receive ring entries backed by the WQE pool.
    #[inline]
    pub fn num_rx_ring_entries(&self) -> usize {
        self.rq_depth * self.strides_per_wqe
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sq_depth == 0 {
            return Err(Error::InvalidConfig("sq_depth cannot be 0".into()));
        }
        if self.rq_depth == 0 {
            return Err(Error::InvalidConfig("rq_depth cannot be 0".into()));
        }
        if self.strides_per_wqe == 0 {
            return Err(Error::InvalidConfig("strides_per_wqe cannot be 0".into()));
        }
        if self.recv_cq_depth == 0 {
            return Err(Error::InvalidConfig("recv_cq_depth cannot be 0".into()));
        }
        if self.recv_slot_size < PKT_HDR_SIZE + MAX_DATA_PER_PKT {
            return Err(Error::InvalidConfig(format!(
                "recv_slot_size {} cannot hold a full packet ({} bytes)",
                self.recv_slot_size,
                PKT_HDR_SIZE + MAX_DATA_PER_PKT
            )));
        }
        if self.signal_interval == 0 {
            return Err(Error::InvalidConfig("signal_interval cannot be 0".into()));
        }
        Ok(())
    }

    /// Set the send descriptor ring capacity.
    pub fn with_sq_depth(mut self, sq_depth: usize) -> Self {
        self.sq_depth = sq_depth;
        self
    }

    /// Set the multi-packet receive WQE pool depth.
    pub fn with_rq_depth(mut self, rq_depth: usize) -> Self {
        self.rq_depth = rq_depth;
        self
    }

    /// Set the number of strides per multi-packet receive WQE.
    pub fn with_strides_per_wqe(mut self, strides_per_wqe: usize) -> Self {
        self.strides_per_wqe = strides_per_wqe;
        self
    }

    /// Set the number of receive completion polling slots.
    pub fn with_recv_cq_depth(mut self, recv_cq_depth: usize) -> Self {
        self.recv_cq_depth = recv_cq_depth;
        self
    }

    /// Set the receive ring slot size.
    pub fn with_recv_slot_size(mut self, recv_slot_size: usize) -> Self {
        self.recv_slot_size = recv_slot_size;
        self
    }

    /// Set the inlining threshold.
    pub fn with_max_inline_data(mut self, max_inline_data: usize) -> Self {
        self.max_inline_data = max_inline_data;
        self
    }

    /// Set the completion sampling interval.
    pub fn with_signal_interval(mut self, signal_interval: u32) -> Self {
        self.signal_interval = signal_interval;
        self
    }
}
