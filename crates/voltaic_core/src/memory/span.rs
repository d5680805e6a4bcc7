//! # Span Allocator
//!
//! Variable-size allocation over fixed-size chunks of arena memory.
//!
//! Each chunk is carved into an address-ordered chain of spans, each tagged
//! allocated or free. Two [`Multimap`]s index the spans:
//!
//! - `free_by_size`: free spans keyed by size, searched for the smallest
//!   adequate span on allocation.
//! - `allocated_by_address`: live allocations keyed by base address, used to
//!   find the span again on free.
//!
//! ```text
//! chunk 1 (base 0x400):
//! [alloc 256][alloc 256][free 512]
//!      ^ allocated_by_address        ^ free_by_size
//! ```
//!
//! Freed spans merge with free neighbours in the same chunk, so no two
//! address-adjacent spans are ever both free. Same-size free spans come back
//! most recently freed first, because that is how a key's value list is ordered.
//!
//! Addresses are virtual: chunk `i` covers `[(i + 1) * chunk_size, (i + 2) * chunk_size)`,
//! so address zero is never handed out. Span bytes are reached through
//! [`SpanAllocator::bytes`] and friends.

use bytemuck::Pod;
use tracing::{debug, trace};

use super::arena::Arena;
use super::rbtree::{Multimap, TreeStore};
use super::slab::SlabPool;
use crate::config::MemoryConfig;
use crate::error::{MemoryError, MemoryResult};

/// Chunk descriptors per slab chunk.
const CHUNKS_PER_BLOCK: usize = 8;

/// Chunk sizes must be a multiple of this so span memory can be word-backed.
pub const SPAN_CHUNK_ALIGN: usize = 8;

/// Index of a span descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SpanId(u32);

impl SpanId {
    fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => Self(index),
            Err(_) => panic!("span index {index} overflows u32"),
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A contiguous range of one chunk.
#[derive(Clone, Copy, Debug, Default)]
struct AddressSpan {
    base: u64,
    size: u64,
    allocated: bool,
    chunk: u32,
    prev: Option<SpanId>,
    next: Option<SpanId>,
}

/// A chunk of span memory and the head of its span chain.
#[derive(Debug, Default)]
struct SpanChunk {
    memory: Box<[u64]>,
    base: u64,
    first: Option<SpanId>,
}

/// Snapshot of allocator usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpanStats {
    /// Chunks grown so far.
    pub chunk_count: usize,
    /// Live allocations.
    pub allocated_spans: usize,
    /// Free spans.
    pub free_spans: usize,
    /// Bytes in live allocations.
    pub allocated_bytes: u64,
    /// Bytes in free spans.
    pub free_bytes: u64,
    /// Size of the largest free span.
    pub largest_free: u64,
}

/// Coalescing span allocator.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. The engine guarantees a single writer.
///
/// # Example
///
/// ```rust
/// use voltaic_core::{Arena, SpanAllocator};
///
/// let arena = Arena::new(1024 * 1024);
/// let mut spans = SpanAllocator::new(&arena, 1024, 64);
///
/// let a = spans.allocate(256);
/// let b = spans.allocate(256);
/// assert_eq!(b, a + 256);
///
/// spans.bytes_mut(a).unwrap()[0] = 7;
/// spans.free(a);
/// assert_eq!(spans.allocate(256), a);
/// assert_eq!(spans.bytes(a).unwrap()[0], 0);
/// ```
#[derive(Debug)]
pub struct SpanAllocator<'a> {
    arena: &'a Arena,
    chunk_size: u64,
    chunks: SlabPool<'a, SpanChunk>,
    spans: SlabPool<'a, AddressSpan>,
    index: TreeStore<'a, SpanId>,
    free_by_size: Multimap<SpanId>,
    allocated_by_address: Multimap<SpanId>,
}

impl<'a> SpanAllocator<'a> {
    /// Creates an allocator with one chunk, seeded as a single free span.
    ///
    /// Bookkeeping pools grow `expected_span_count` records at a time.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero or not a multiple of
    /// [`SPAN_CHUNK_ALIGN`], if `expected_span_count` is zero, or if the arena
    /// is exhausted.
    #[must_use]
    pub fn new(arena: &'a Arena, chunk_size: usize, expected_span_count: usize) -> Self {
        match Self::try_new(arena, chunk_size, expected_span_count) {
            Ok(allocator) => allocator,
            Err(err) => panic!("span allocator creation failed: {err}"),
        }
    }

    /// Creates an allocator, reporting bad parameters and arena exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] for unusable sizes and
    /// [`MemoryError::ArenaExhausted`] if the first chunk does not fit.
    pub fn try_new(
        arena: &'a Arena,
        chunk_size: usize,
        expected_span_count: usize,
    ) -> MemoryResult<Self> {
        if chunk_size == 0 || chunk_size % SPAN_CHUNK_ALIGN != 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "span chunk size {chunk_size} must be a non-zero multiple of {SPAN_CHUNK_ALIGN}"
            )));
        }
        if expected_span_count == 0 {
            return Err(MemoryError::InvalidConfig(
                "expected span count must be greater than zero".to_string(),
            ));
        }

        let mut allocator = Self {
            arena,
            chunk_size: chunk_size as u64,
            chunks: SlabPool::try_new(arena, CHUNKS_PER_BLOCK)?,
            spans: SlabPool::try_new(arena, expected_span_count)?,
            index: TreeStore::try_new(arena, expected_span_count, expected_span_count)?,
            free_by_size: Multimap::new(),
            allocated_by_address: Multimap::new(),
        };
        allocator.add_chunk()?;
        Ok(allocator)
    }

    /// Creates an allocator from the engine memory configuration.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error, or
    /// [`MemoryError::ArenaExhausted`] if the first chunk does not fit.
    pub fn from_config(arena: &'a Arena, config: &MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;
        Self::try_new(arena, config.span_chunk_size, config.expected_span_count)
    }

    /// Size of every chunk in bytes.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    /// Number of chunks grown so far.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.allocated_count()
    }

    /// Allocates `size` zeroed bytes and returns their address.
    ///
    /// Takes the smallest free span that fits, most recently freed first
    /// among equal sizes, and grows a chunk if none fits.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or not smaller than the chunk size, or if a
    /// new chunk is needed and the arena is exhausted.
    pub fn allocate(&mut self, size: usize) -> u64 {
        let size = size as u64;
        assert!(size > 0, "span allocation size must be greater than zero");
        assert!(
            size < self.chunk_size,
            "span allocation of {size} bytes must be smaller than the chunk size {}",
            self.chunk_size
        );

        let node = match self.free_by_size.lower_bound(&self.index, size) {
            Some(node) => node,
            None => {
                if let Err(err) = self.add_chunk() {
                    panic!("span allocator growth failed: {err}");
                }
                match self.free_by_size.lower_bound(&self.index, size) {
                    Some(node) => node,
                    None => unreachable!("fresh chunk cannot hold {size} bytes"),
                }
            }
        };

        let Some(id) = self.free_by_size.pop_value(&mut self.index, node) else {
            unreachable!("free size index holds an empty node");
        };
        if self.index.value_len(node) == 0 {
            self.free_by_size.remove_node(&mut self.index, node);
        }

        let span = *self.span(id);
        if span.size > size {
            let rest = SpanId::from_index(self.spans.push(AddressSpan {
                base: span.base + size,
                size: span.size - size,
                allocated: false,
                chunk: span.chunk,
                prev: Some(id),
                next: span.next,
            }));
            if let Some(next) = span.next {
                self.span_mut(next).prev = Some(rest);
            }
            self.span_mut(id).next = Some(rest);
            self.free_by_size.insert(&mut self.index, span.size - size, rest);
            trace!(base = span.base, size, rest = span.size - size, "span split");
        }

        let allocated = self.span_mut(id);
        allocated.size = size;
        allocated.allocated = true;
        self.allocated_by_address.insert(&mut self.index, span.base, id);

        self.span_bytes_mut(id).fill(0);
        span.base
    }

    /// Frees the allocation at `addr`, merging it with free neighbours.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not the address of a live allocation.
    pub fn free(&mut self, addr: u64) {
        if let Err(err) = self.try_free(addr) {
            panic!("span free failed: {err}");
        }
    }

    /// Frees the allocation at `addr`, reporting unknown addresses.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownAddress`] if `addr` is not a live allocation.
    pub fn try_free(&mut self, addr: u64) -> MemoryResult<()> {
        let node = self
            .allocated_by_address
            .find(&self.index, addr)
            .ok_or(MemoryError::UnknownAddress(addr))?;
        let Some(id) = self.allocated_by_address.pop_value(&mut self.index, node) else {
            unreachable!("address index holds an empty node");
        };
        self.allocated_by_address.remove_node(&mut self.index, node);

        self.span_mut(id).allocated = false;
        let mut merged = *self.span(id);

        if let Some(prev_id) = merged.prev {
            let prev = *self.span(prev_id);
            if !prev.allocated {
                self.unindex_free(prev_id, prev.size);
                merged.base = prev.base;
                merged.size += prev.size;
                merged.prev = prev.prev;
                match prev.prev {
                    Some(before) => self.span_mut(before).next = Some(id),
                    None => self.chunk_mut(merged.chunk).first = Some(id),
                }
                self.spans.free(prev_id.index());
                trace!(base = merged.base, size = merged.size, "span merged backward");
            }
        }

        if let Some(next_id) = merged.next {
            let next = *self.span(next_id);
            if !next.allocated {
                self.unindex_free(next_id, next.size);
                merged.size += next.size;
                merged.next = next.next;
                if let Some(after) = next.next {
                    self.span_mut(after).prev = Some(id);
                }
                self.spans.free(next_id.index());
                trace!(base = merged.base, size = merged.size, "span merged forward");
            }
        }

        *self.span_mut(id) = merged;
        self.free_by_size.insert(&mut self.index, merged.size, id);
        Ok(())
    }

    /// Size of the live allocation at `addr`.
    #[must_use]
    pub fn size_of(&self, addr: u64) -> Option<usize> {
        self.live_span(addr).map(|id| self.span(id).size as usize)
    }

    /// Bytes of the live allocation at `addr`.
    #[must_use]
    pub fn bytes(&self, addr: u64) -> Option<&[u8]> {
        let id = self.live_span(addr)?;
        let span = self.span(id);
        let chunk = self.chunk(span.chunk);
        let offset = (span.base - chunk.base) as usize;
        Some(&bytemuck::cast_slice::<u64, u8>(&chunk.memory)[offset..offset + span.size as usize])
    }

    /// Mutable bytes of the live allocation at `addr`.
    pub fn bytes_mut(&mut self, addr: u64) -> Option<&mut [u8]> {
        let id = self.live_span(addr)?;
        Some(self.span_bytes_mut(id))
    }

    /// The live allocation at `addr` viewed as a slice of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownAddress`] if `addr` is not live, or
    /// [`MemoryError::InvalidView`] if the span's size or alignment does not fit `T`.
    pub fn view<T: Pod>(&self, addr: u64) -> MemoryResult<&[T]> {
        let bytes = self.bytes(addr).ok_or(MemoryError::UnknownAddress(addr))?;
        bytemuck::try_cast_slice(bytes).map_err(|err| MemoryError::InvalidView {
            addr,
            reason: format!("{err:?}"),
        })
    }

    /// The live allocation at `addr` viewed as a mutable slice of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::UnknownAddress`] if `addr` is not live, or
    /// [`MemoryError::InvalidView`] if the span's size or alignment does not fit `T`.
    pub fn view_mut<T: Pod>(&mut self, addr: u64) -> MemoryResult<&mut [T]> {
        let bytes = self.bytes_mut(addr).ok_or(MemoryError::UnknownAddress(addr))?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|err| MemoryError::InvalidView {
            addr,
            reason: format!("{err:?}"),
        })
    }

    /// Current usage.
    #[must_use]
    pub fn stats(&self) -> SpanStats {
        let mut stats = SpanStats {
            chunk_count: self.chunk_count(),
            largest_free: self
                .free_by_size
                .last(&self.index)
                .map_or(0, |node| self.index.key(node)),
            ..SpanStats::default()
        };
        for (_, span) in self.spans.iter() {
            if span.allocated {
                stats.allocated_spans += 1;
                stats.allocated_bytes += span.size;
            } else {
                stats.free_spans += 1;
                stats.free_bytes += span.size;
            }
        }
        stats
    }

    /// Walks every chunk's span chain and both index trees.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: broken contiguity, chunk-size
    /// conservation, adjacent free spans, spans missing from their index,
    /// or any tree invariant.
    pub fn verify(&self) -> MemoryResult<()> {
        let mut seen = 0;
        let mut free_seen = 0;
        let mut allocated_seen = 0;

        for (chunk_idx, chunk) in self.chunks.iter() {
            let chunk_idx = chunk_idx as u32;
            let mut expected = chunk.base;
            let mut prev: Option<SpanId> = None;
            let mut prev_free = false;
            let mut cur = chunk.first;

            while let Some(id) = cur {
                seen += 1;
                if seen > self.spans.allocated_count() {
                    return Err(MemoryError::IndexMismatch {
                        addr: expected,
                        reason: "span chain loops",
                    });
                }

                let span = self.span(id);
                if span.base != expected {
                    return Err(MemoryError::SpanDiscontiguous {
                        chunk: chunk_idx,
                        expected,
                        found: span.base,
                    });
                }
                if span.prev != prev || span.chunk != chunk_idx {
                    return Err(MemoryError::IndexMismatch {
                        addr: span.base,
                        reason: "span chain links are inconsistent",
                    });
                }
                if !span.allocated && prev_free {
                    return Err(MemoryError::AdjacentFreeSpans {
                        first: prev.map_or(0, |prev| self.span(prev).base),
                        second: span.base,
                    });
                }

                if span.allocated {
                    allocated_seen += 1;
                    let indexed = self
                        .allocated_by_address
                        .find(&self.index, span.base)
                        .and_then(|node| self.index.first_value(node));
                    if indexed != Some(&id) {
                        return Err(MemoryError::IndexMismatch {
                            addr: span.base,
                            reason: "allocated span missing from address index",
                        });
                    }
                } else {
                    free_seen += 1;
                    let indexed = self
                        .free_by_size
                        .find(&self.index, span.size)
                        .is_some_and(|node| self.index.values(node).any(|&value| value == id));
                    if !indexed {
                        return Err(MemoryError::IndexMismatch {
                            addr: span.base,
                            reason: "free span missing from size index",
                        });
                    }
                }

                expected = span.base + span.size;
                prev = Some(id);
                prev_free = !span.allocated;
                cur = span.next;
            }

            let covered = expected - chunk.base;
            if covered != self.chunk_size {
                return Err(MemoryError::ChunkSizeMismatch {
                    chunk: chunk_idx,
                    covered,
                    chunk_size: self.chunk_size,
                });
            }
        }

        if seen != self.spans.allocated_count()
            || free_seen != self.free_by_size.value_count()
            || allocated_seen != self.allocated_by_address.value_count()
        {
            return Err(MemoryError::IndexMismatch {
                addr: 0,
                reason: "span and index counts disagree",
            });
        }

        self.free_by_size.check_invariants(&self.index)?;
        self.allocated_by_address.check_invariants(&self.index)
    }

    /// Asserts [`SpanAllocator::verify`] in debug builds.
    ///
    /// # Panics
    ///
    /// Panics on any violation when debug assertions are enabled.
    #[inline]
    pub fn debug_verify(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.verify() {
                panic!("span allocator invariant violated: {err}");
            }
        }
    }

    fn add_chunk(&mut self) -> MemoryResult<()> {
        let memory = self
            .arena
            .try_alloc_slice::<u64>(self.chunk_size as usize / SPAN_CHUNK_ALIGN)?;
        let chunk_idx = self.chunks.push(SpanChunk {
            memory,
            base: 0,
            first: None,
        });
        let chunk = match u32::try_from(chunk_idx) {
            Ok(chunk) => chunk,
            Err(_) => panic!("span chunk index {chunk_idx} overflows u32"),
        };
        let base = (chunk_idx as u64 + 1) * self.chunk_size;

        let id = SpanId::from_index(self.spans.push(AddressSpan {
            base,
            size: self.chunk_size,
            allocated: false,
            chunk,
            prev: None,
            next: None,
        }));
        let descriptor = self.chunk_mut(chunk);
        descriptor.base = base;
        descriptor.first = Some(id);
        self.free_by_size.insert(&mut self.index, self.chunk_size, id);

        debug!(
            chunk = chunk_idx,
            base,
            chunk_size = self.chunk_size,
            arena_used = self.arena.used(),
            "span allocator grew"
        );
        Ok(())
    }

    fn unindex_free(&mut self, id: SpanId, size: u64) {
        let Some(node) = self.free_by_size.find(&self.index, size) else {
            panic!("free span of {size} bytes missing from size index");
        };
        if self.free_by_size.remove_single_value(&mut self.index, node, &id).is_none() {
            panic!("free span of {size} bytes missing from its size list");
        }
        if self.index.value_len(node) == 0 {
            self.free_by_size.remove_node(&mut self.index, node);
        }
    }

    fn live_span(&self, addr: u64) -> Option<SpanId> {
        let node = self.allocated_by_address.find(&self.index, addr)?;
        self.index.first_value(node).copied()
    }

    fn span_bytes_mut(&mut self, id: SpanId) -> &mut [u8] {
        let span = *self.span(id);
        let chunk = self.chunk_mut(span.chunk);
        let offset = (span.base - chunk.base) as usize;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut chunk.memory)[offset..offset + span.size as usize]
    }

    fn span(&self, id: SpanId) -> &AddressSpan {
        match self.spans.get(id.index()) {
            Some(span) => span,
            None => panic!("dangling span {}", id.0),
        }
    }

    fn span_mut(&mut self, id: SpanId) -> &mut AddressSpan {
        match self.spans.get_mut(id.index()) {
            Some(span) => span,
            None => panic!("dangling span {}", id.0),
        }
    }

    fn chunk(&self, chunk: u32) -> &SpanChunk {
        match self.chunks.get(chunk as usize) {
            Some(chunk) => chunk,
            None => panic!("dangling span chunk {chunk}"),
        }
    }

    fn chunk_mut(&mut self, chunk: u32) -> &mut SpanChunk {
        match self.chunks.get_mut(chunk as usize) {
            Some(descriptor) => descriptor,
            None => panic!("dangling span chunk {chunk}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 1024;

    fn allocator(arena: &Arena) -> SpanAllocator<'_> {
        SpanAllocator::new(arena, CHUNK, 32)
    }

    #[test]
    fn test_new_seeds_one_free_span() {
        let arena = Arena::new(1024 * 1024);
        let spans = allocator(&arena);
        let stats = spans.stats();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.free_spans, 1);
        assert_eq!(stats.free_bytes, CHUNK as u64);
        assert_eq!(stats.largest_free, CHUNK as u64);
        spans.verify().unwrap();
    }

    #[test]
    fn test_allocate_splits_prefix() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(100);
        assert_eq!(a, CHUNK as u64);
        assert_eq!(spans.size_of(a), Some(100));

        let stats = spans.stats();
        assert_eq!(stats.allocated_spans, 1);
        assert_eq!(stats.allocated_bytes, 100);
        assert_eq!(stats.free_bytes, 924);
        spans.verify().unwrap();
    }

    #[test]
    fn test_exact_fit_leaves_no_remainder() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(1000);
        let b = spans.allocate(24);
        assert_eq!(b, a + 1000);
        let stats = spans.stats();
        assert_eq!(stats.free_spans, 0);
        assert_eq!(stats.largest_free, 0);
        spans.verify().unwrap();
    }

    #[test]
    fn test_exhaustion_grows_second_chunk() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(256);
        let b = spans.allocate(256);
        let c = spans.allocate(256);
        assert_eq!(spans.chunk_count(), 1);

        let d = spans.allocate(512);
        assert_eq!(spans.chunk_count(), 2);
        assert_eq!(d, 2 * CHUNK as u64);
        spans.verify().unwrap();

        spans.free(a);
        spans.free(b);
        spans.free(c);
        spans.verify().unwrap();

        // Chunk 1 coalesced back into one 1024-byte span; the tighter
        // 512-byte tail of chunk 2 wins the best fit.
        let stats = spans.stats();
        assert_eq!(stats.free_spans, 2);
        assert_eq!(stats.largest_free, 1024);
        assert_eq!(spans.allocate(256), d + 512);
        spans.verify().unwrap();
    }

    #[test]
    fn test_free_then_allocate_same_size_reuses_address() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let _a = spans.allocate(64);
        let b = spans.allocate(128);
        let _c = spans.allocate(64);

        spans.free(b);
        assert_eq!(spans.allocate(128), b);
        spans.verify().unwrap();
    }

    #[test]
    fn test_same_size_spans_come_back_lifo() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(64);
        let _b = spans.allocate(64);
        let c = spans.allocate(64);
        let _d = spans.allocate(64);

        spans.free(a);
        spans.free(c);
        assert_eq!(spans.allocate(64), c);
        assert_eq!(spans.allocate(64), a);
        spans.verify().unwrap();
    }

    #[test]
    fn test_adjacent_frees_coalesce() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(256);
        let b = spans.allocate(256);
        let _c = spans.allocate(256);

        spans.free(a);
        spans.free(b);
        let stats = spans.stats();
        assert_eq!(stats.free_spans, 2);
        assert_eq!(stats.largest_free, 512);
        spans.verify().unwrap();

        assert_eq!(spans.allocate(512), a);
        spans.verify().unwrap();
    }

    #[test]
    fn test_free_merges_both_sides() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(100);
        let b = spans.allocate(100);
        let c = spans.allocate(100);

        spans.free(a);
        spans.free(c);
        assert_eq!(spans.stats().free_spans, 2);

        spans.free(b);
        let stats = spans.stats();
        assert_eq!(stats.free_spans, 1);
        assert_eq!(stats.free_bytes, CHUNK as u64);
        spans.verify().unwrap();
    }

    #[test]
    fn test_allocations_are_zeroed() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(32);
        spans.bytes_mut(a).unwrap().fill(0xAB);
        spans.free(a);

        let again = spans.allocate(32);
        assert_eq!(again, a);
        assert!(spans.bytes(again).unwrap().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_typed_views() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(64);
        {
            let words = spans.view_mut::<u64>(a).unwrap();
            assert_eq!(words.len(), 8);
            words[3] = 0x0102_0304;
        }
        assert_eq!(spans.view::<u64>(a).unwrap()[3], 0x0102_0304);

        let odd = spans.allocate(3);
        assert!(matches!(
            spans.view::<u32>(odd),
            Err(MemoryError::InvalidView { .. })
        ));
        assert_eq!(spans.view::<u8>(7), Err(MemoryError::UnknownAddress(7)));
    }

    #[test]
    fn test_try_free_unknown_address() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(16);
        assert_eq!(spans.try_free(a + 1), Err(MemoryError::UnknownAddress(a + 1)));
        assert!(spans.try_free(a).is_ok());
        assert_eq!(spans.try_free(a), Err(MemoryError::UnknownAddress(a)));
    }

    #[test]
    #[should_panic(expected = "smaller than the chunk size")]
    fn test_allocate_chunk_size_panics() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        spans.allocate(CHUNK);
    }

    #[test]
    #[should_panic(expected = "no live allocation")]
    fn test_double_free_panics() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(16);
        spans.free(a);
        spans.free(a);
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let arena = Arena::new(1024 * 1024);
        assert!(matches!(
            SpanAllocator::try_new(&arena, 1001, 16),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpanAllocator::try_new(&arena, 1024, 0),
            Err(MemoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_arena_exhaustion_reported() {
        let arena = Arena::new(2048);
        assert!(matches!(
            SpanAllocator::try_new(&arena, 4096, 4),
            Err(MemoryError::ArenaExhausted { .. })
        ));
    }

    #[test]
    fn test_verify_detects_adjacent_free_spans() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(64);
        let id = spans.live_span(a).unwrap();
        spans.span_mut(id).allocated = false;
        assert!(spans.verify().is_err());
    }

    #[test]
    fn test_verify_detects_discontiguity() {
        let arena = Arena::new(1024 * 1024);
        let mut spans = allocator(&arena);
        let a = spans.allocate(64);
        let id = spans.live_span(a).unwrap();
        spans.span_mut(id).size = 60;
        assert!(matches!(
            spans.verify(),
            Err(MemoryError::SpanDiscontiguous { .. })
        ));
    }
}
