//! Transmit datapath benchmarks over the in-memory queue pair.

use std::net::Ipv4Addr;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use raweth::test_utils::MockQp;
use raweth::{
    LocalEndpoint, MsgBuffer, RawTransport, RoutingInfo, TransportConfig, TxBurstItem,
    BASE_UDP_PORT, MAX_DATA_PER_PKT,
};

fn bench_tx_burst(c: &mut Criterion) {
    let config = TransportConfig::default();
    let local = LocalEndpoint::for_rpc_id([0x02, 0, 0, 0, 0, 0x01], Ipv4Addr::new(10, 0, 0, 1), 0);
    let routing = RoutingInfo {
        mac: [0x02, 0, 0, 0, 0, 0x02],
        ipv4: Ipv4Addr::new(10, 0, 0, 2),
        udp_port: BASE_UDP_PORT,
    };

    let qp = MockQp::for_config(&config);
    let mut transport = RawTransport::new(qp, local, config).unwrap();

    let num_pkts = 8;
    let buf = MsgBuffer::new(num_pkts * MAX_DATA_PER_PKT).unwrap();
    let items: Vec<TxBurstItem> = (0..num_pkts)
        .map(|i| TxBurstItem {
            msg_buffer: &buf,
            offset: i * MAX_DATA_PER_PKT,
            data_bytes: MAX_DATA_PER_PKT,
            routing: &routing,
        })
        .collect();

    let mut group = c.benchmark_group("tx_burst");
    group.throughput(Throughput::Elements(num_pkts as u64));
    group.bench_function("8_pkt_batch", |b| {
        b.iter(|| {
            transport.tx_burst(black_box(&items));
            transport.qp_mut().sent.clear();
        })
    });
    group.finish();
}

criterion_group!(benches, bench_tx_burst);
criterion_main!(benches);
