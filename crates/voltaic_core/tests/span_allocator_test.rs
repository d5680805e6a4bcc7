//! # Span Allocator Stress Tests
//!
//! Seeded random allocate/free interleavings checked against a shadow list
//! of live allocations.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use voltaic_core::{Arena, MemoryConfig, SpanAllocator};

const CHUNK: usize = 4096;

/// Live allocation tracked by the test.
struct Live {
    addr: u64,
    size: usize,
    tag: u8,
}

fn assert_disjoint(live: &[Live]) {
    let mut ranges: Vec<(u64, u64)> = live
        .iter()
        .map(|entry| (entry.addr, entry.addr + entry.size as u64))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "allocations overlap: {pair:?}");
    }
}

#[test]
fn test_random_interleaving_keeps_structure() {
    let arena = Arena::new(16 * 1024 * 1024);
    let mut spans = SpanAllocator::new(&arena, CHUNK, 64);
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut live: Vec<Live> = Vec::new();

    for step in 0..4000u32 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let size = rng.gen_range(1..CHUNK / 4);
            let addr = spans.allocate(size);
            let tag = (step % 251) as u8 + 1;
            let bytes = spans.bytes_mut(addr).unwrap();
            assert!(bytes.iter().all(|&byte| byte == 0), "allocation not zeroed");
            bytes.fill(tag);
            live.push(Live { addr, size, tag });
        } else {
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            let bytes = spans.bytes(victim.addr).unwrap();
            assert_eq!(bytes.len(), victim.size);
            assert!(bytes.iter().all(|&byte| byte == victim.tag), "allocation clobbered");
            spans.free(victim.addr);
        }

        if step % 50 == 0 {
            spans.verify().unwrap();
            assert_disjoint(&live);
        }
    }

    let stats = spans.stats();
    assert_eq!(stats.allocated_spans, live.len());
    assert_eq!(
        stats.allocated_bytes,
        live.iter().map(|entry| entry.size as u64).sum::<u64>()
    );
    assert_eq!(
        stats.allocated_bytes + stats.free_bytes,
        (stats.chunk_count * CHUNK) as u64
    );

    for entry in live.drain(..) {
        spans.free(entry.addr);
    }
    spans.verify().unwrap();

    // Every chunk coalesces back to a single free span.
    let stats = spans.stats();
    assert_eq!(stats.allocated_spans, 0);
    assert_eq!(stats.free_spans, stats.chunk_count);
    assert_eq!(stats.largest_free, CHUNK as u64);
}

#[test]
fn test_free_in_reverse_order_coalesces() {
    let arena = Arena::new(1024 * 1024);
    let mut spans = SpanAllocator::new(&arena, CHUNK, 16);
    let addrs: Vec<u64> = (0..32).map(|_| spans.allocate(100)).collect();

    for &addr in addrs.iter().rev() {
        spans.free(addr);
        spans.verify().unwrap();
    }
    assert_eq!(spans.stats().free_spans, 1);
}

#[test]
fn test_best_fit_prefers_tightest_span() {
    let arena = Arena::new(1024 * 1024);
    let mut spans = SpanAllocator::new(&arena, CHUNK, 16);

    // Free holes of 300, 100 and 200 bytes, separated by live spacers.
    let big = spans.allocate(300);
    let _spacer_a = spans.allocate(8);
    let small = spans.allocate(100);
    let _spacer_b = spans.allocate(8);
    let medium = spans.allocate(200);
    let _spacer_c = spans.allocate(8);
    spans.free(big);
    spans.free(small);
    spans.free(medium);

    assert_eq!(spans.allocate(150), medium);
    assert_eq!(spans.allocate(90), small);
    assert_eq!(spans.allocate(250), big);
    spans.verify().unwrap();
}

#[test]
fn test_growth_keeps_chunk_addresses_apart() {
    let arena = Arena::new(1024 * 1024);
    let mut spans = SpanAllocator::new(&arena, CHUNK, 16);
    let mut bases = Vec::new();
    for _ in 0..6 {
        bases.push(spans.allocate(CHUNK - 8));
    }
    assert_eq!(spans.chunk_count(), 6);
    for (i, &base) in bases.iter().enumerate() {
        assert_eq!(base, ((i + 1) * CHUNK) as u64);
    }
    spans.verify().unwrap();
}

#[test]
fn test_from_config() {
    let config = MemoryConfig::from_toml_str(
        "arena_bytes = 1048576\nspan_chunk_size = 8192\nexpected_span_count = 32\n",
    )
    .unwrap();
    let arena = config.build_arena();
    let mut spans = SpanAllocator::from_config(&arena, &config).unwrap();
    assert_eq!(spans.chunk_size(), 8192);

    let addr = spans.allocate(8000);
    assert_eq!(spans.size_of(addr), Some(8000));
    spans.free(addr);
    assert_eq!(spans.size_of(addr), None);
}
