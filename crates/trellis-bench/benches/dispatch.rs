//! Dispatch benchmarks for Trellis.
//!
//! These benchmarks measure delivery throughput for the send and broadcast
//! operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use trellis_bench::{accept_all, linear_tree, wide_tree};
use trellis_core::Router;

/// Benchmark point-to-point delivery.
fn bench_send_direct(c: &mut Criterion) {
    let router = Router::new();
    router
        .register_addressed_handler("target", |_| true)
        .unwrap();

    c.bench_function("send_direct", |b| {
        b.iter(|| {
            router
                .send_direct(
                    black_box("target"),
                    "ping",
                    json!({"seq": 1}),
                    black_box("sender"),
                )
                .unwrap()
        })
    });
}

/// Benchmark bubbling up fully-subscribed chains.
fn bench_send_toward_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_toward_root");

    for depth in [10, 100] {
        let router = Router::new();
        let ids = linear_tree(&router, depth);
        accept_all(&router, &ids);
        let leaf = ids.last().unwrap().clone();

        group.throughput(Throughput::Elements(depth as u64 - 1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                router
                    .send_toward_root(black_box(&leaf), "bubble", json!(null))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark tree-wide broadcast over fully-subscribed trees.
fn bench_broadcast_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_tree");

    for fanout in [8, 32] {
        let router = Router::new();
        let ids = wide_tree(&router, fanout);
        accept_all(&router, &ids);

        group.throughput(Throughput::Elements(ids.len() as u64 - 1));
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                router
                    .broadcast_tree(black_box("root"), "refresh", json!(null))
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark pruned subtree broadcast where only branch roots accept.
fn bench_broadcast_children_pruned(c: &mut Criterion) {
    let router = Router::new();
    wide_tree(&router, 32);
    // Only the branches accept; every leaf subtree is pruned.
    for i in 0..32 {
        router
            .register_addressed_handler(&format!("branch-{}", i), |_| true)
            .unwrap();
    }

    c.bench_function("broadcast_children_pruned", |b| {
        b.iter(|| {
            router
                .broadcast_to_children(black_box("root"), "refresh", json!(null))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_send_direct,
    bench_send_toward_root,
    bench_broadcast_tree,
    bench_broadcast_children_pruned
);
criterion_main!(benches);
