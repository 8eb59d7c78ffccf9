//! Benchmarks for the node-selection engine.

use adaptlb::balance::{fnv1a_32, pick, NodeSnapshot, ResourceSample};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

fn build_snapshots(count: usize) -> Vec<NodeSnapshot> {
    (0..count)
        .map(|i| NodeSnapshot {
            node_id: i,
            connections: (i as u32 * 7) % 40,
            max_connections: 100,
            matches_source: i == count / 2,
            response_times: (0..20)
                .map(|j| Duration::from_millis(10 + ((i * 13 + j) % 90) as u64))
                .collect(),
            resources: ResourceSample {
                cpu: ((i * 17) % 100) as u8,
                memory: (i as u64 + 1) << 28,
            },
        })
        .collect()
}

fn benchmark_pick(c: &mut Criterion) {
    for pool_size in [3usize, 10, 50] {
        let snapshots = build_snapshots(pool_size);
        c.bench_function(&format!("pick_{}_nodes", pool_size), |b| {
            b.iter(|| black_box(pick(black_box(&snapshots), true)))
        });
    }
}

fn benchmark_hash(c: &mut Criterion) {
    c.bench_function("fnv1a_32_ipv4", |b| {
        b.iter(|| black_box(fnv1a_32(black_box(b"203.0.113.254"))))
    });
}

criterion_group!(benches, benchmark_pick, benchmark_hash);
criterion_main!(benches);
