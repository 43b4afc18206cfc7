//! # Pool Benchmark
//!
//! Measures the handle-indexed pool end to end: insert/erase churn, handle
//! resolution, guarded iteration, and lock overhead under thread contention.
//!
//! Run with: `cargo bench --package kiln_core`

// Benchmarks don't need docs and may have intentionally unused code
#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_core::{Id, NoLock, Pool, PoolConfig, PoolStore, SpinLock};

/// Payload sized like a typical pooled game object.
#[derive(Clone, Copy)]
struct Payload {
    position: [f32; 4],
    velocity: [f32; 4],
    flags: u64,
}

impl Payload {
    fn new(seed: usize) -> Self {
        let f = seed as f32;
        Self {
            position: [f, f * 0.5, f * 0.25, 1.0],
            velocity: [0.1, 0.2, 0.3, 0.0],
            flags: seed as u64,
        }
    }
}

/// Benchmark: insert up to N values, uncontended.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_insert");

    for count in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let pool: Pool<Payload, NoLock> = Pool::new(PoolConfig::default());
                for i in 0..count {
                    black_box(pool.insert(Payload::new(i)).unwrap());
                }
                pool.len()
            });
        });
    }

    group.finish();
}

/// Benchmark: erase-and-reinsert cycle over a warm pool, exercising handle
/// recycling rather than growth.
fn bench_churn(c: &mut Criterion) {
    let pool: Pool<Payload, NoLock> = Pool::new(PoolConfig::default());
    let mut ids: Vec<Id> = (0..100_000)
        .map(|i| pool.insert(Payload::new(i)).unwrap())
        .collect();

    c.bench_function("pool_churn_10K_of_100K", |b| {
        b.iter(|| {
            for id in ids.iter().take(10_000) {
                black_box(pool.erase(*id));
            }
            for (i, id) in ids.iter_mut().take(10_000).enumerate() {
                *id = pool.insert(Payload::new(i)).unwrap();
            }
            pool.len()
        });
    });
}

/// Benchmark: random handle resolution through the guard path.
fn bench_find(c: &mut Criterion) {
    let pool: Pool<Payload, NoLock> = Pool::new(PoolConfig::default());
    let ids: Vec<Id> = (0..100_000)
        .map(|i| pool.insert(Payload::new(i)).unwrap())
        .collect();

    let probe: Vec<usize> = {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        (0..10_000)
            .map(|i: u64| {
                let mut hasher = DefaultHasher::new();
                i.hash(&mut hasher);
                (hasher.finish() as usize) % ids.len()
            })
            .collect()
    };

    c.bench_function("pool_random_find_10K", |b| {
        b.iter(|| {
            let mut sum = 0.0_f32;
            for &p in &probe {
                if let Some(payload) = pool.find(ids[p]) {
                    sum += payload.position[0];
                }
            }
            black_box(sum)
        });
    });
}

/// Benchmark: full guarded iteration over a pool's live slots.
fn bench_iter(c: &mut Criterion) {
    let pool: Pool<Payload, NoLock> = Pool::new(PoolConfig::default());
    for i in 0..100_000 {
        pool.insert(Payload::new(i)).unwrap();
    }

    c.bench_function("pool_iter_100K", |b| {
        b.iter(|| {
            let mut sum = 0.0_f32;
            for (_, payload) in pool.iter() {
                sum += payload.position[0];
            }
            black_box(sum)
        });
    });
}

/// Benchmark: spin lock overhead relative to the unlocked policy.
fn bench_lock_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_lock_overhead");

    let unlocked: Pool<Payload, NoLock> = Pool::new(PoolConfig::default());
    let id = unlocked.insert(Payload::new(0)).unwrap();
    group.bench_function("no_lock_find", |b| {
        b.iter(|| black_box(unlocked.find(id).map(|p| p.flags)));
    });

    let locked: Pool<Payload, SpinLock> = Pool::new(PoolConfig::default());
    let id = locked.insert(Payload::new(0)).unwrap();
    group.bench_function("spin_lock_find", |b| {
        b.iter(|| black_box(locked.find(id).map(|p| p.flags)));
    });

    group.finish();
}

/// Benchmark: contended insert/erase churn across threads sharing one store.
fn bench_contended_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_contended_churn");
    group.sample_size(10);

    for threads in [2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let store = PoolStore::<Payload, SpinLock>::new(PoolConfig::default());
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let store = Arc::clone(&store);
                            thread::spawn(move || {
                                let pool = store.view();
                                for i in 0..1_000 {
                                    let id = pool.insert(Payload::new(t * 1_000 + i)).unwrap();
                                    black_box(pool.find(id).map(|p| p.flags));
                                    pool.erase(id);
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                    store.len()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_churn,
    bench_find,
    bench_iter,
    bench_lock_overhead,
    bench_contended_churn,
);

criterion_main!(benches);
