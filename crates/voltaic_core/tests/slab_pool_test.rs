//! # Slab Pool Stress Tests

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use voltaic_core::{Arena, SlabPool};

#[test]
fn test_random_allocate_free_matches_model() {
    let arena = Arena::new(4 * 1024 * 1024);
    let mut pool: SlabPool<'_, u64> = SlabPool::new(&arena, 37);
    let mut model: BTreeMap<usize, u64> = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    for step in 0..6000u64 {
        if model.is_empty() || rng.gen_bool(0.55) {
            let index = pool.push(step);
            assert!(model.insert(index, step).is_none(), "slot {index} handed out twice");
        } else {
            let nth = rng.gen_range(0..model.len());
            let Some(&index) = model.keys().nth(nth) else {
                unreachable!();
            };
            let value = model.remove(&index).unwrap();
            assert_eq!(pool.free(index), value);
            assert!(!pool.is_occupied(index));
        }

        if step % 200 == 0 {
            let live: Vec<(usize, u64)> = pool.iter().map(|(index, &value)| (index, value)).collect();
            let expected: Vec<(usize, u64)> = model.iter().map(|(&index, &value)| (index, value)).collect();
            assert_eq!(live, expected);
            assert_eq!(pool.allocated_count(), model.len());
            assert_eq!(pool.free_count(), pool.capacity() - model.len());
        }
    }
}

#[test]
fn test_freed_slot_is_reused_before_growth() {
    let arena = Arena::new(1024 * 1024);
    let mut pool: SlabPool<'_, u32> = SlabPool::new(&arena, 8);
    let indices: Vec<usize> = (0..16).map(|i| pool.push(i)).collect();
    assert_eq!(pool.chunk_count(), 2);

    pool.free(indices[3]);
    pool.free(indices[12]);
    assert_eq!(pool.push(100), 3);
    assert_eq!(pool.push(101), 12);
    assert_eq!(pool.chunk_count(), 2);

    pool.push(102);
    assert_eq!(pool.chunk_count(), 3);
}

#[test]
fn test_pool_draws_from_arena() {
    let arena = Arena::new(1024 * 1024);
    let before = arena.used();
    let mut pool: SlabPool<'_, [u64; 8]> = SlabPool::new(&arena, 16);
    let first = arena.used();
    assert!(first >= before + 16 * 64);

    for _ in 0..17 {
        pool.push([7; 8]);
    }
    assert!(arena.used() >= first + 16 * 64);
    assert_eq!(arena.allocation_count(), 4);
}
