//! # Stream Ingest Benchmarks
//!
//! | Path | Work |
//! |------|------|
//! | Quorum | Verify one signature per node and group by hash |
//! | Framing | Decode and hash a record file |
//! | Selection | Shuffle and cover the download ratio of stake |

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_crypto::DigestAlgorithm;
use stream_ingest::algorithms::{decode_data_file, decode_signature_file, encode_signature_file};
use stream_ingest::{
    select_nodes, MemoryObjectStore, SignatureQuorumVerifier, SimulatedNode, StreamFilename,
    StreamKind, StreamPublisher,
};

const T0: i64 = 1_700_000_000_000_000_000;

fn network(size: u8) -> Vec<SimulatedNode> {
    (0..size)
        .map(|i| SimulatedNode::ed25519(format!("0.0.{}", i as u32 + 3), 10, i + 1))
        .collect()
}

fn bench_quorum(c: &mut Criterion) {
    let mut group = c.benchmark_group("quorum");
    let mut publisher =
        StreamPublisher::new(std::sync::Arc::new(MemoryObjectStore::new()), StreamKind::Record);
    let file = publisher.build(T0, &[b"tx"]).unwrap();
    let name = StreamFilename::signature(StreamKind::Record, T0);

    for size in [4u8, 16, 64] {
        let nodes = network(size);
        let consensus: Vec<_> = nodes.iter().map(SimulatedNode::consensus_node).collect();
        let signatures: BTreeMap<_, _> = nodes
            .iter()
            .map(|node| {
                let metadata = file.metadata_hash.as_ref().map(|h| node.attest(h));
                let bytes = encode_signature_file(&node.attest(&file.hash), metadata.as_ref());
                let decoded =
                    decode_signature_file(&node.id, &name, DigestAlgorithm::Sha384, &bytes)
                        .unwrap();
                (node.id.clone(), decoded)
            })
            .collect();
        let verifier = SignatureQuorumVerifier::default();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("verify", size), &size, |b, _| {
            b.iter(|| black_box(verifier.verify(&name, &signatures, &consensus)))
        });
    }
    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    let payloads: Vec<Vec<u8>> = (0..1000).map(|i| vec![i as u8; 256]).collect();
    let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    let mut publisher =
        StreamPublisher::new(std::sync::Arc::new(MemoryObjectStore::new()), StreamKind::Record);
    let file = publisher.build(T0, &refs).unwrap();

    group.throughput(Throughput::Bytes(file.bytes.len() as u64));
    group.bench_function("decode_record_v6", |b| {
        b.iter(|| {
            black_box(
                decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &file.bytes)
                    .unwrap(),
            )
        })
    });
    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let nodes: Vec<_> = network(100)
        .iter()
        .map(SimulatedNode::consensus_node)
        .collect();
    c.bench_function("select_nodes_100", |b| {
        b.iter(|| black_box(select_nodes(&nodes, 0.5)))
    });
}

criterion_group!(benches, bench_quorum, bench_framing, bench_selection);
criterion_main!(benches);
