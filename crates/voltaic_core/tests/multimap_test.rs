//! # Multimap Model Tests
//!
//! Random insert/remove sequences compared against a `BTreeMap` model.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use voltaic_core::{Arena, KeyedStore, Multimap, TreeStore};

/// Contents as `(key, values most recent first)`.
fn snapshot(tree: &Multimap<u32>, store: &TreeStore<'_, u32>) -> Vec<(u64, Vec<u32>)> {
    tree.iter(store)
        .map(|(key, values)| (key, values.copied().collect()))
        .collect()
}

fn model_snapshot(model: &BTreeMap<u64, Vec<u32>>) -> Vec<(u64, Vec<u32>)> {
    model
        .iter()
        .map(|(&key, values)| (key, values.iter().rev().copied().collect()))
        .collect()
}

#[test]
fn test_random_operations_match_model() {
    let arena = Arena::new(8 * 1024 * 1024);
    let mut store = TreeStore::new(&arena, 64, 64);
    let mut tree = Multimap::new();
    let mut model: BTreeMap<u64, Vec<u32>> = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for step in 0..5000u32 {
        let key = rng.gen_range(0..300u64);
        match rng.gen_range(0..10) {
            0..=5 => {
                let outcome = tree.insert(&mut store, key, step);
                let values = model.entry(key).or_default();
                assert_eq!(outcome.created, values.is_empty());
                values.push(step);
            }
            6 | 7 => {
                let removed = tree.delete(&mut store, key);
                assert_eq!(removed, model.remove(&key).is_some());
            }
            _ => {
                let Some(node) = tree.find(&store, key) else {
                    assert!(!model.contains_key(&key));
                    continue;
                };
                let values = model.get_mut(&key).unwrap();
                let target = values[rng.gen_range(0..values.len())];
                assert_eq!(tree.remove_single_value(&mut store, node, &target), Some(target));
                values.retain(|&value| value != target);
                if values.is_empty() {
                    tree.remove_node(&mut store, node);
                    model.remove(&key);
                }
            }
        }

        if step % 100 == 0 {
            tree.check_invariants(&store).unwrap();
            assert_eq!(snapshot(&tree, &store), model_snapshot(&model));
        }
    }

    tree.check_invariants(&store).unwrap();
    assert_eq!(tree.len(), model.len());
    assert_eq!(
        tree.value_count(),
        model.values().map(Vec::len).sum::<usize>()
    );
    assert_eq!(store.node_count(), tree.len());
}

#[test]
fn test_lower_bound_matches_model() {
    let arena = Arena::new(1024 * 1024);
    let mut store = TreeStore::new(&arena, 32, 32);
    let mut tree = Multimap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut keys = Vec::new();

    for _ in 0..200 {
        let key = rng.gen_range(0..10_000u64);
        tree.insert(&mut store, key, 0u32);
        keys.push(key);
    }
    keys.sort_unstable();

    for _ in 0..500 {
        let probe = rng.gen_range(0..10_500u64);
        let expected = keys.iter().copied().find(|&key| key >= probe);
        let found = tree.lower_bound(&store, probe).map(|node| store.key(node));
        assert_eq!(found, expected, "lower bound of {probe}");
    }
}

#[test]
fn test_traversals_agree() {
    let arena = Arena::new(1024 * 1024);
    let mut store = TreeStore::new(&arena, 32, 32);
    let mut tree = Multimap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..300 {
        tree.insert(&mut store, rng.gen_range(0..1000u64), 1u32);
    }

    let iterated: Vec<u64> = tree.iter(&store).map(|(key, _)| key).collect();

    let mut threaded = Vec::new();
    tree.for_each_in_order(&mut store, |key, _| threaded.push(key));
    assert_eq!(threaded, iterated);

    let mut post = Vec::new();
    tree.for_each_post_order(&store, |key, _| post.push(key));
    post.sort_unstable();
    assert_eq!(post, iterated);

    let mut stack = vec![tree.root().unwrap(); tree.len()];
    let mut pre = Vec::new();
    tree.for_each_pre_order(&store, &mut stack, |key, _| pre.push(key));
    assert_eq!(pre.first().copied(), tree.root().map(|root| store.key(root)));
    pre.sort_unstable();
    assert_eq!(pre, iterated);

    tree.check_invariants(&store).unwrap();
}

#[test]
fn test_keyed_store_drains_to_empty() {
    let arena = Arena::new(1024 * 1024);
    let mut keyed: KeyedStore<'_, u32> = KeyedStore::new(&arena, 16);
    for i in 0..500u32 {
        keyed.insert(u64::from(i % 37), i);
    }
    assert_eq!(keyed.len(), 37);
    assert_eq!(keyed.value_count(), 500);

    for key in 0..37u64 {
        let drained = keyed.drain_key(key);
        assert!(drained.windows(2).all(|pair| pair[0] > pair[1]));
        keyed.check_invariants().unwrap();
    }
    assert!(keyed.is_empty());
    assert_eq!(keyed.value_count(), 0);
}
