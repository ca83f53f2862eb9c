//! # raweth - raw Ethernet datapath for a kernel-bypass RPC stack
//!
//! This crate implements the data-plane transport of a high-performance RPC
//! system: it turns application message buffers into hardware-ready Ethernet
//! packets and drains hardware completion state, writing full L2--L4 headers
//! directly into pinned memory handed to a NIC queue.
//!
//! ## Features
//!
//! - **Zero-copy segmentation**: large messages are split into fixed-size
//!   wire packets referencing the message memory directly
//! - **Chained batch submission**: one doorbell per transmit batch over a
//!   pre-linked descriptor ring
//! - **Descriptor inlining**: small single-fragment packets are copied into
//!   the descriptor instead of DMA'd
//! - **O(1) completion polling**: wraparound-safe cursor arithmetic over a
//!   fixed-depth completion ring, without reading completion payloads
//! - **Amortized buffer replenishment**: receive buffers are reposted one
//!   multi-packet WQE per stride
//!
//! ## Usage
//!
//! ```ignore
//! use raweth::{LocalEndpoint, RawTransport, RoutingInfo, TransportConfig, TxBurstItem};
//!
//! let local = LocalEndpoint::for_rpc_id(local_mac, local_ipv4, rpc_id);
//! let mut transport = RawTransport::new(qp, local, TransportConfig::default())?;
//!
//! // Data-plane loop
//! transport.tx_burst(&items);
//! let new_completions = transport.rx_burst();
//! transport.post_recvs(new_completions);
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: queue geometry and tuning ([`TransportConfig`])
//! - [`packet`]: per-packet header layout ([`PktHdr`])
//! - [`headers`]: frame header records and codec ([`EthHdr`], [`Ipv4Hdr`], [`UdpHdr`])
//! - [`buffer`]: message buffers and the receive ring ([`MsgBuffer`], [`RecvRing`])
//! - [`wire`]: descriptor ring elements and cursor arithmetic
//! - [`device`]: the hardware queue pair seam ([`RawQp`])
//! - [`transport`]: the datapath ([`RawTransport`])
//! - [`test_utils`]: in-memory queue pair for tests and benchmarks
//!
//! Session establishment, peer resolution, flow control and
//! request-response matching are external collaborators; this layer is a
//! thin bridge between message buffers and hardware descriptors.

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod headers;
pub mod packet;
pub mod test_utils;
pub mod transport;
pub mod wire;

// Re-export main types
pub use buffer::{MsgBuffer, RecvRing};
pub use config::TransportConfig;
pub use device::RawQp;
pub use error::{Error, Result};
pub use headers::{
    EthHdr, Ipv4Hdr, LocalEndpoint, RoutingInfo, UdpHdr, BASE_UDP_PORT, HEADROOM_BYTES,
};
pub use packet::{PktHdr, PktType, MAX_DATA_PER_PKT, PKT_HDR_SIZE, RPC_HDR_BYTES};
pub use transport::{IntervalSignal, RawTransport, SignalPolicy, TxBurstItem};
pub use wire::{CqeSnapshot, SendDescriptor, SendFlags, Sge};
