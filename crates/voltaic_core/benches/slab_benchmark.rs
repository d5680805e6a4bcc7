//! # Slab Pool and Multimap Benchmark
//!
//! Run with: `cargo bench --package voltaic_core --bench slab_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use voltaic_core::{Arena, Multimap, SlabPool, TreeStore};

/// Arena large enough for every benchmark iteration.
const ARENA_BYTES: usize = 64 * 1024 * 1024;

/// Benchmark: Push then free every slot.
fn bench_slab_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("slab_churn");

    for count in [1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let arena = Arena::new(ARENA_BYTES);
                let mut pool: SlabPool<'_, u64> = SlabPool::new(&arena, 256);
                for i in 0..count {
                    black_box(pool.push(i as u64));
                }
                for i in (0..count).step_by(2) {
                    black_box(pool.free(i));
                }
                for i in 0..count / 2 {
                    black_box(pool.push(i as u64));
                }
                pool.allocated_count()
            });
        });
    }

    group.finish();
}

/// Benchmark: Insert ascending keys, then delete them all.
fn bench_multimap_insert_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("multimap_insert_delete");

    for count in [1_000u64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let arena = Arena::new(ARENA_BYTES);
                let mut store: TreeStore<'_, u32> = TreeStore::new(&arena, 1024, 1024);
                let mut tree = Multimap::new();
                for key in 0..count {
                    tree.insert(&mut store, key, 0);
                }
                for key in 0..count {
                    black_box(tree.delete(&mut store, key));
                }
                tree.len()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slab_churn, bench_multimap_insert_delete);
criterion_main!(benches);
