//! Datapath integration tests over the in-memory queue pair.

use std::net::Ipv4Addr;

use raweth::test_utils::MockQp;
use raweth::{
    IntervalSignal, LocalEndpoint, MsgBuffer, PktHdr, PktType, RawTransport, RoutingInfo,
    TransportConfig, TxBurstItem, BASE_UDP_PORT, MAX_DATA_PER_PKT, PKT_HDR_SIZE, RPC_HDR_BYTES,
};

const RPC_ID: u8 = 7;

fn local_endpoint() -> LocalEndpoint {
    LocalEndpoint::for_rpc_id(
        [0x02, 0, 0, 0, 0, 0x01],
        Ipv4Addr::new(192, 168, 1, 2),
        RPC_ID,
    )
}

fn peer() -> RoutingInfo {
    RoutingInfo {
        mac: [0x02, 0, 0, 0, 0, 0x02],
        ipv4: Ipv4Addr::new(192, 168, 1, 9),
        udp_port: BASE_UDP_PORT,
    }
}

fn make_transport(config: TransportConfig) -> RawTransport<MockQp> {
    let qp = MockQp::for_config(&config);
    RawTransport::new(qp, local_endpoint(), config).unwrap()
}

/// Small queue geometry so stride and ring-depth edges are reachable.
fn small_config() -> TransportConfig {
    TransportConfig::default()
        .with_sq_depth(8)
        .with_rq_depth(4)
        .with_strides_per_wqe(8)
        .with_recv_cq_depth(4)
}

/// Split a message into per-packet transmit items.
fn segment<'a>(buf: &'a MsgBuffer, routing: &'a RoutingInfo) -> Vec<TxBurstItem<'a>> {
    let mut items = Vec::new();
    let mut offset = 0;
    loop {
        let data_bytes = (buf.data_size() - offset).min(MAX_DATA_PER_PKT);
        items.push(TxBurstItem {
            msg_buffer: buf,
            offset,
            data_bytes,
            routing,
        });
        offset += data_bytes;
        if offset >= buf.data_size() {
            break;
        }
    }
    items
}

// =============================================================================
// Segmentation
// =============================================================================

#[test]
fn test_three_packet_message() {
    let mut transport = make_transport(TransportConfig::default());
    let routing = peer();

    let mut buf = MsgBuffer::new(3000).unwrap();
    for (i, b) in buf.data_mut().iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }

    let items = segment(&buf, &routing);
    assert_eq!(items.len(), 3);
    assert_eq!(
        items.iter().map(|i| (i.offset, i.data_bytes)).collect::<Vec<_>>(),
        vec![(0, 1024), (1024, 1024), (2048, 952)]
    );

    transport.tx_burst(&items);

    let qp = transport.qp();
    assert_eq!(qp.doorbells, 1);
    assert_eq!(qp.sent.len(), 3);

    // First packet is one contiguous fragment, the rest are header + slice.
    assert_eq!(qp.sent[0].num_frags(), 1);
    assert_eq!(qp.sent[0].frags[0].len(), PKT_HDR_SIZE + 1024);
    for pkt in &qp.sent[1..] {
        assert_eq!(pkt.num_frags(), 2);
        assert_eq!(pkt.frags[0].len(), PKT_HDR_SIZE);
    }
    assert_eq!(qp.sent[1].frags[1].len(), 1024);
    assert_eq!(qp.sent[2].frags[1].len(), 952);

    // Concatenated payloads reconstruct the message exactly.
    let wire: Vec<u8> = qp.sent.iter().flat_map(|p| p.payload()).collect();
    assert_eq!(wire, buf.data());
}

#[test]
fn test_control_packet() {
    let mut transport = make_transport(TransportConfig::default());
    let routing = peer();

    let buf = MsgBuffer::control().unwrap();
    assert!(buf.is_fake());

    transport.tx_burst(&[TxBurstItem {
        msg_buffer: &buf,
        offset: 0,
        data_bytes: 0,
        routing: &routing,
    }]);

    let qp = transport.qp();
    assert_eq!(qp.sent.len(), 1);
    assert_eq!(qp.sent[0].num_frags(), 1);
    assert_eq!(qp.sent[0].frags[0].len(), PKT_HDR_SIZE);
    assert!(qp.sent[0].inlined);
}

#[test]
fn test_inline_threshold() {
    // Default inline threshold is 120 bytes; PKT_HDR_SIZE is 58.
    let mut transport = make_transport(TransportConfig::default());
    let routing = peer();

    let at_limit = MsgBuffer::new(120 - PKT_HDR_SIZE).unwrap();
    let over_limit = MsgBuffer::new(120 - PKT_HDR_SIZE + 1).unwrap();

    transport.tx_burst(&segment(&at_limit, &routing));
    transport.tx_burst(&segment(&over_limit, &routing));

    let qp = transport.qp();
    assert!(qp.sent[0].inlined);
    assert!(!qp.sent[1].inlined);
}

#[test]
fn test_continuation_never_inlined() {
    let mut transport = make_transport(TransportConfig::default());
    let routing = peer();

    // Second packet carries one byte: tiny, but still two fragments and
    // therefore never inlined.
    let buf = MsgBuffer::new(MAX_DATA_PER_PKT + 1).unwrap();
    let items = segment(&buf, &routing);
    assert_eq!(items.len(), 2);

    transport.tx_burst(&items);

    let qp = transport.qp();
    assert_eq!(qp.sent[1].num_frags(), 2);
    assert_eq!(qp.sent[1].frags[1].len(), 1);
    assert!(!qp.sent[1].inlined);
}

// =============================================================================
// Wire headers
// =============================================================================

#[test]
fn test_frame_header_fields() {
    let mut transport = make_transport(TransportConfig::default());
    let routing = peer();
    let local = local_endpoint();

    let mut buf = MsgBuffer::new(100).unwrap();
    *buf.pkthdr_mut(0) = PktHdr::new(3, 100, 9, PktType::Req, 0, 17);

    transport.tx_burst(&segment(&buf, &routing));

    let bytes = transport.qp().sent[0].bytes();
    let (eth, ipv4, udp) = raweth::headers::parse_frame_header(&bytes);

    assert_eq!(eth.dst_mac, routing.mac);
    assert_eq!(eth.src_mac, local.mac);
    assert_eq!(eth.eth_type(), raweth::headers::ETH_TYPE_IPV4);

    assert_eq!(ipv4.src(), local.ipv4);
    assert_eq!(ipv4.dst(), routing.ipv4);
    assert_eq!(ipv4.tot_len(), 20 + 8 + RPC_HDR_BYTES + 100);

    assert_eq!(udp.src_port(), BASE_UDP_PORT + RPC_ID as u16);
    assert_eq!(udp.dst_port(), routing.udp_port);
    assert_eq!(udp.len(), 8 + RPC_HDR_BYTES + 100);

    // The RPC header the caller wrote rides behind the frame headers.
    let hdr = PktHdr::from_bytes(&bytes).unwrap();
    assert_eq!(hdr.req_type(), 3);
    assert_eq!(hdr.msg_size(), 100);
    assert_eq!(hdr.dest_session_num(), 9);
    assert_eq!(hdr.req_num(), 17);
}

#[test]
fn test_headers_regenerated_per_send() {
    let mut transport = make_transport(TransportConfig::default());
    let first_peer = peer();
    let second_peer = RoutingInfo {
        mac: [0x02, 0, 0, 0, 0, 0x55],
        ipv4: Ipv4Addr::new(10, 0, 0, 9),
        udp_port: 9999,
    };

    let buf = MsgBuffer::new(64).unwrap();
    transport.tx_burst(&segment(&buf, &first_peer));
    transport.tx_burst(&segment(&buf, &second_peer));

    let qp = transport.qp();
    let (eth_a, _, udp_a) = raweth::headers::parse_frame_header(&qp.sent[0].bytes());
    let (eth_b, ipv4_b, udp_b) = raweth::headers::parse_frame_header(&qp.sent[1].bytes());

    assert_eq!(eth_a.dst_mac, first_peer.mac);
    assert_eq!(udp_a.dst_port(), first_peer.udp_port);
    assert_eq!(eth_b.dst_mac, second_peer.mac);
    assert_eq!(ipv4_b.dst(), second_peer.ipv4);
    assert_eq!(udp_b.dst_port(), second_peer.udp_port);
}

// =============================================================================
// Descriptor ring
// =============================================================================

#[test]
fn test_chain_restored_after_burst() {
    let config = small_config();
    let sq_depth = config.sq_depth;
    let mut transport = make_transport(config);
    let routing = peer();
    let buf = MsgBuffer::control().unwrap();

    let item = TxBurstItem {
        msg_buffer: &buf,
        offset: 0,
        data_bytes: 0,
        routing: &routing,
    };

    for batch in [1, 3, sq_depth] {
        transport.tx_burst(&vec![item; batch]);
        for (i, desc) in transport.send_ring().iter().enumerate().take(sq_depth) {
            assert_eq!(desc.next, Some(i + 1), "slot {} after batch of {}", i, batch);
        }
    }
    assert_eq!(transport.qp().doorbells, 3);
}

#[test]
fn test_signal_sampling() {
    let mut transport = make_transport(TransportConfig::default());
    transport.set_signal_policy(Box::new(IntervalSignal::new(2)));
    let routing = peer();
    let buf = MsgBuffer::control().unwrap();

    let item = TxBurstItem {
        msg_buffer: &buf,
        offset: 0,
        data_bytes: 0,
        routing: &routing,
    };
    transport.tx_burst(&[item; 4]);

    let signaled: Vec<bool> = transport.qp().sent.iter().map(|p| p.signaled).collect();
    assert_eq!(signaled, vec![true, false, true, false]);
}

// =============================================================================
// Completion polling
// =============================================================================

#[test]
fn test_rx_burst_counts_new_completions() {
    let mut transport = make_transport(small_config());

    // Nothing has arrived yet.
    assert_eq!(transport.rx_burst(), 0);
    assert_eq!(transport.rx_burst(), 0);

    // Five completions become visible: exactly one call reports them.
    transport.qp_mut().set_cycle_idx(5);
    assert_eq!(transport.rx_burst(), 5);
    assert_eq!(transport.rx_burst(), 0);

    // Seven more.
    transport.qp_mut().set_cycle_idx(12);
    assert_eq!(transport.rx_burst(), 7);
    assert_eq!(transport.rx_burst(), 0);
}

#[test]
fn test_rx_burst_rejects_out_of_range_delta() {
    let config = small_config();
    let ring_entries = config.num_rx_ring_entries();
    let mut transport = make_transport(config);

    // A delta at or past the ring depth is stale or torn data, not a batch.
    transport.qp_mut().set_cycle_idx(ring_entries);
    assert_eq!(transport.rx_burst(), 0);
    transport.qp_mut().set_cycle_idx(2 * ring_entries + 3);
    assert_eq!(transport.rx_burst(), 0);

    // The tracker state did not advance: a valid delta still works.
    transport.qp_mut().set_cycle_idx(3);
    assert_eq!(transport.rx_burst(), 3);
}

#[test]
fn test_rx_burst_polling_slot_advances() {
    let mut transport = make_transport(small_config());

    // Arrange differing snapshots per slot; rx_burst reads slot 0 first and
    // only moves to slot 1 after a valid delta.
    transport.qp_mut().set_slot_snapshot(0, raweth::CqeSnapshot::from_cycle_idx(4, 8));
    transport.qp_mut().set_slot_snapshot(1, raweth::CqeSnapshot::from_cycle_idx(6, 8));

    assert_eq!(transport.rx_burst(), 4);
    assert_eq!(transport.rx_burst(), 2);
    assert_eq!(transport.rx_burst(), 0); // slot 2 still holds the initial cursor
}

// =============================================================================
// Receive replenishment
// =============================================================================

#[test]
fn test_post_recvs_batches_by_stride() {
    // Stride threshold of 8.
    let mut transport = make_transport(small_config());

    transport.post_recvs(5);
    assert_eq!(transport.qp().mp_posts.len(), 0);
    transport.post_recvs(2);
    assert_eq!(transport.qp().mp_posts.len(), 0);

    // The call that reaches the threshold issues exactly one post.
    transport.post_recvs(1);
    assert_eq!(transport.qp().mp_posts.len(), 1);

    // Credits consumed; accumulation starts over.
    transport.post_recvs(7);
    assert_eq!(transport.qp().mp_posts.len(), 1);
    transport.post_recvs(1);
    assert_eq!(transport.qp().mp_posts.len(), 2);
}

#[test]
fn test_post_recvs_keeps_remainder() {
    let mut transport = make_transport(small_config());

    // Overshooting the stride keeps the remainder for the next one.
    transport.post_recvs(10);
    assert_eq!(transport.qp().mp_posts.len(), 1);
    assert_eq!(transport.recvs_to_post(), 2);

    transport.post_recvs(6);
    assert_eq!(transport.qp().mp_posts.len(), 2);
    assert_eq!(transport.recvs_to_post(), 0);
}

#[test]
fn test_post_recvs_cycles_wqe_pool() {
    // rq_depth of 4: the fifth post reuses the first pool entry.
    let mut transport = make_transport(small_config());

    for _ in 0..5 {
        transport.post_recvs(8);
    }

    let posts = &transport.qp().mp_posts;
    assert_eq!(posts.len(), 5);
    assert_eq!(posts[4].addr, posts[0].addr);
    assert_ne!(posts[1].addr, posts[0].addr);
    // Each post covers one WQE's strides.
    let slot_bytes = 8 * transport.config().recv_slot_size;
    assert!(posts.iter().all(|s| s.len as usize == slot_bytes));
}
