//! Throughput benchmarks across all seven container families.
//!
//! Run: cargo bench --bench bench_containers

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::thread;

use fluxcell::{Arena, BstEfrb, CkSpsc, FollySpsc, List, MsQueue, OpResult, VyukovMpmc, VyukovMpsc};

const OPS: u64 = 100_000;

fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("insert_then_pop", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(64 * 1024 * 1024).unwrap();
            let list = List::init(&arena).unwrap();
            for k in 0..OPS {
                list.insert(black_box(k), k);
            }
            let mut out = Default::default();
            while list.pop(&mut out) == OpResult::Success {}
        })
    });
    group.finish();
}

fn bench_ms_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ms_queue");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("two_producers_one_consumer", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(64 * 1024 * 1024).unwrap();
            let queue = MsQueue::init(&arena).unwrap();
            thread::scope(|scope| {
                scope.spawn(|| {
                    for k in 0..OPS / 2 {
                        while queue.insert(black_box(k), k) != OpResult::Success {}
                    }
                });
                scope.spawn(|| {
                    for k in OPS / 2..OPS {
                        while queue.insert(black_box(k), k) != OpResult::Success {}
                    }
                });
            });
            let mut out = Default::default();
            while queue.pop(&mut out) == OpResult::Success {}
        })
    });
    group.finish();
}

fn bench_vyukov_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("vyukov_mpmc");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("fill_drain", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(64 * 1024 * 1024).unwrap();
            let queue = VyukovMpmc::init(&arena, 4096).unwrap();
            for k in 0..OPS {
                while queue.insert(black_box(k), k) != OpResult::Success {
                    let mut out = Default::default();
                    queue.pop(&mut out);
                }
            }
            let mut out = Default::default();
            while queue.pop(&mut out) == OpResult::Success {}
        })
    });
    group.finish();
}

fn bench_vyukov_mpsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("vyukov_mpsc");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("insert_then_pop", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(64 * 1024 * 1024).unwrap();
            let queue = VyukovMpsc::init(&arena).unwrap();
            for k in 0..OPS {
                queue.insert(black_box(k), k);
            }
            let mut out = Default::default();
            loop {
                match queue.pop(&mut out) {
                    OpResult::Success => {}
                    OpResult::Busy => continue,
                    _ => break,
                }
            }
        })
    });
    group.finish();
}

fn bench_spsc_folly(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_folly");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("producer_consumer", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(4 * 1024 * 1024).unwrap();
            let ring = FollySpsc::init(&arena, 1024).unwrap();
            thread::scope(|scope| {
                scope.spawn(|| {
                    let mut sent = 0u64;
                    while sent < OPS {
                        if ring.insert(black_box(sent), sent) == OpResult::Success {
                            sent += 1;
                        }
                    }
                });
                scope.spawn(|| {
                    let mut received = 0u64;
                    let mut out = Default::default();
                    while received < OPS {
                        if ring.pop(&mut out) == OpResult::Success {
                            received += 1;
                        }
                    }
                });
            });
        })
    });
    group.finish();
}

fn bench_spsc_ck(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ck");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function(BenchmarkId::new("producer_consumer", OPS), |b| {
        b.iter(|| {
            let arena = Arena::new(4 * 1024 * 1024).unwrap();
            let ring = CkSpsc::init(&arena, 1024).unwrap();
            thread::scope(|scope| {
                scope.spawn(|| {
                    let mut sent = 0u64;
                    while sent < OPS {
                        if ring.insert(black_box(sent), sent) == OpResult::Success {
                            sent += 1;
                        }
                    }
                });
                scope.spawn(|| {
                    let mut received = 0u64;
                    let mut out = Default::default();
                    while received < OPS {
                        if ring.pop(&mut out) == OpResult::Success {
                            received += 1;
                        }
                    }
                });
            });
        })
    });
    group.finish();
}

fn bench_bst_efrb(c: &mut Criterion) {
    let mut group = c.benchmark_group("bst_efrb");
    let n = OPS / 10;
    group.throughput(Throughput::Elements(n));
    group.bench_function(BenchmarkId::new("insert_search_delete", n), |b| {
        b.iter(|| {
            let arena = Arena::new(64 * 1024 * 1024).unwrap();
            let tree = BstEfrb::init(&arena).unwrap();
            for k in 0..n {
                tree.insert(black_box(k), k);
            }
            for k in 0..n {
                black_box(tree.search(k));
            }
            for k in 0..n {
                tree.delete(black_box(k));
            }
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_list,
    bench_ms_queue,
    bench_vyukov_mpmc,
    bench_vyukov_mpsc,
    bench_spsc_folly,
    bench_spsc_ck,
    bench_bst_efrb,
);
criterion_main!(benches);
