//! # Slab Pool
//!
//! Growable pool of fixed-size slots, grouped into chunks of `blocks_per_chunk`
//! slots with one occupancy bit each. Every subsystem that needs pooled object
//! storage holds one of these, including the tree and span bookkeeping below.
//!
//! ```text
//! chunk 0: [##########]  full
//! chunk 1: [###.#..##.]  <- first-free hint
//! chunk 2: [..........]
//! ```
//!
//! Unoccupied slots always hold `T::default()`: freeing moves the value out,
//! so a slot is handed out zeroed the first time and every time after.

use tracing::debug;

use super::arena::Arena;
use super::bitmap::{words_for, OccupancyBitmap};
use crate::error::MemoryResult;

/// One chunk of slots plus its occupancy bits.
#[derive(Debug)]
struct SlabChunk<T> {
    slots: Box<[T]>,
    occupancy: OccupancyBitmap,
}

/// A chunked pool allocator for fixed-size objects.
///
/// Slots are addressed by a global index: `chunk * blocks_per_chunk + offset`.
/// Indices stay valid until the slot is freed; chunks are never released.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. The engine guarantees a single writer.
///
/// # Example
///
/// ```rust
/// use voltaic_core::{Arena, SlabPool};
///
/// let arena = Arena::new(64 * 1024);
/// let mut pool: SlabPool<'_, u32> = SlabPool::new(&arena, 64);
///
/// let index = pool.push(42);
/// assert_eq!(pool.get(index), Some(&42));
///
/// assert_eq!(pool.free(index), 42);
/// assert!(pool.get(index).is_none());
/// ```
#[derive(Debug)]
pub struct SlabPool<'a, T> {
    /// Arena that chunk storage is drawn from.
    arena: &'a Arena,
    /// Chunks in index order.
    chunks: Vec<SlabChunk<T>>,
    /// Slots per chunk.
    blocks_per_chunk: usize,
    /// Lowest chunk known to have a free slot.
    first_free: Option<usize>,
    /// Number of occupied slots.
    allocated_count: usize,
}

impl<'a, T> SlabPool<'a, T> {
    /// Size of one slot in bytes.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    /// Slots per chunk.
    #[inline]
    #[must_use]
    pub const fn blocks_per_chunk(&self) -> usize {
        self.blocks_per_chunk
    }

    /// Number of chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.blocks_per_chunk
    }

    /// Returns the number of currently allocated objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Same as [`SlabPool::allocated_count`].
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.allocated_count
    }

    /// True if no slot is occupied.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.allocated_count
    }

    /// Lowest chunk index known to have a free slot.
    #[inline]
    #[must_use]
    pub const fn first_free_chunk(&self) -> Option<usize> {
        self.first_free
    }

    /// Checks whether a slot is occupied.
    #[inline]
    #[must_use]
    pub fn is_occupied(&self, index: usize) -> bool {
        if index >= self.capacity() {
            return false;
        }
        let (chunk_idx, offset) = self.split_index(index);
        self.chunks[chunk_idx].occupancy.test(offset)
    }

    /// Gets a reference to an occupied slot.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if !self.is_occupied(index) {
            return None;
        }
        let (chunk_idx, offset) = self.split_index(index);
        Some(&self.chunks[chunk_idx].slots[offset])
    }

    /// Gets a mutable reference to an occupied slot.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if !self.is_occupied(index) {
            return None;
        }
        let (chunk_idx, offset) = self.split_index(index);
        Some(&mut self.chunks[chunk_idx].slots[offset])
    }

    /// Iterates over occupied slots in index order.
    #[must_use]
    pub fn iter(&self) -> SlabIter<'_, T> {
        SlabIter {
            chunks: &self.chunks,
            blocks_per_chunk: self.blocks_per_chunk,
            chunk: 0,
            next_bit: 0,
        }
    }

    /// Iterates mutably over occupied slots in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        let blocks_per_chunk = self.blocks_per_chunk;
        self.chunks
            .iter_mut()
            .enumerate()
            .filter(|(_, chunk)| chunk.occupancy.count_ones() > 0)
            .flat_map(move |(chunk_idx, chunk)| {
                let SlabChunk { slots, occupancy } = chunk;
                let occupancy = &*occupancy;
                slots
                    .iter_mut()
                    .enumerate()
                    .filter(move |(offset, _)| occupancy.test(*offset))
                    .map(move |(offset, slot)| (chunk_idx * blocks_per_chunk + offset, slot))
            })
    }

    #[inline]
    const fn split_index(&self, index: usize) -> (usize, usize) {
        (index / self.blocks_per_chunk, index % self.blocks_per_chunk)
    }
}

impl<'a, T: Default> SlabPool<'a, T> {
    /// Creates a pool with one chunk drawn from `arena`.
    ///
    /// # Panics
    ///
    /// Panics if `blocks_per_chunk` is zero or the arena is exhausted.
    #[must_use]
    pub fn new(arena: &'a Arena, blocks_per_chunk: usize) -> Self {
        match Self::try_new(arena, blocks_per_chunk) {
            Ok(pool) => pool,
            Err(err) => panic!("slab pool creation failed: {err}"),
        }
    }

    /// Creates a pool with one chunk, reporting arena exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::ArenaExhausted`] if the first chunk does not fit.
    ///
    /// # Panics
    ///
    /// Panics if `blocks_per_chunk` is zero.
    pub fn try_new(arena: &'a Arena, blocks_per_chunk: usize) -> MemoryResult<Self> {
        assert!(blocks_per_chunk > 0, "Blocks per chunk must be greater than zero");

        let mut pool = Self {
            arena,
            chunks: Vec::new(),
            blocks_per_chunk,
            first_free: None,
            allocated_count: 0,
        };
        pool.try_grow()?;
        Ok(pool)
    }

    /// Allocates the lowest free slot of the hint chunk, growing if every chunk is full.
    ///
    /// Returns the slot index and the (default-valued) slot.
    ///
    /// # Panics
    ///
    /// Panics if growth is needed and the arena is exhausted.
    pub fn allocate_next(&mut self) -> (usize, &mut T) {
        let chunk_idx = match self.first_free {
            Some(chunk_idx) => chunk_idx,
            None => {
                self.grow();
                self.chunks.len() - 1
            }
        };

        let Some(offset) = self.chunks[chunk_idx].occupancy.first_unset_from(0) else {
            unreachable!("first-free hint points at full chunk {chunk_idx}");
        };
        self.occupy(chunk_idx, offset);

        let index = chunk_idx * self.blocks_per_chunk + offset;
        (index, &mut self.chunks[chunk_idx].slots[offset])
    }

    /// Allocates a slot and stores the object.
    ///
    /// # Returns
    ///
    /// The index of the new slot.
    pub fn push(&mut self, value: T) -> usize {
        let (index, slot) = self.allocate_next();
        *slot = value;
        index
    }

    /// Occupies the slot at an explicit index.
    ///
    /// An already-occupied slot is returned unchanged.
    ///
    /// # Returns
    ///
    /// The slot, or None if `index` is beyond the capacity.
    pub fn allocate_at(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.capacity() {
            return None;
        }
        let (chunk_idx, offset) = self.split_index(index);
        if !self.chunks[chunk_idx].occupancy.test(offset) {
            self.occupy(chunk_idx, offset);
        }
        Some(&mut self.chunks[chunk_idx].slots[offset])
    }

    /// Frees an occupied slot and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is beyond the capacity or the slot is already free.
    pub fn free(&mut self, index: usize) -> T {
        assert!(index < self.capacity(), "slot {index} is beyond capacity {}", self.capacity());
        let (chunk_idx, offset) = self.split_index(index);

        let chunk = &mut self.chunks[chunk_idx];
        assert!(chunk.occupancy.clear(offset), "slot {index} is already free");
        let value = std::mem::take(&mut chunk.slots[offset]);
        self.allocated_count -= 1;

        // The freed chunk now has room, so the hint can only move earlier.
        if self.first_free.map_or(true, |hint| chunk_idx < hint) {
            self.first_free = Some(chunk_idx);
        }
        value
    }

    /// Frees every slot while keeping all chunk storage.
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            if chunk.occupancy.count_ones() > 0 {
                for slot in chunk.slots.iter_mut() {
                    *slot = T::default();
                }
                chunk.occupancy.clear_all();
            }
        }
        self.allocated_count = 0;
        self.first_free = (!self.chunks.is_empty()).then_some(0);
    }

    fn occupy(&mut self, chunk_idx: usize, offset: usize) {
        let chunk = &mut self.chunks[chunk_idx];
        chunk.occupancy.set(offset);
        self.allocated_count += 1;

        if chunk.occupancy.is_full() && self.first_free == Some(chunk_idx) {
            self.first_free = self.chunks[chunk_idx + 1..]
                .iter()
                .position(|chunk| !chunk.occupancy.is_full())
                .map(|pos| chunk_idx + 1 + pos);
        }
    }

    fn grow(&mut self) {
        if let Err(err) = self.try_grow() {
            panic!("slab pool growth failed: {err}");
        }
    }

    fn try_grow(&mut self) -> MemoryResult<()> {
        let slots = self.arena.try_alloc_slice::<T>(self.blocks_per_chunk)?;
        let words = self.arena.try_alloc_slice::<u32>(words_for(self.blocks_per_chunk))?;

        self.chunks.push(SlabChunk {
            slots,
            occupancy: OccupancyBitmap::from_words(words, self.blocks_per_chunk),
        });
        let chunk_idx = self.chunks.len() - 1;
        if self.first_free.is_none() {
            self.first_free = Some(chunk_idx);
        }

        debug!(
            chunk = chunk_idx,
            block_size = self.block_size(),
            capacity = self.capacity(),
            "slab pool grew"
        );
        Ok(())
    }
}

/// Iterator over the occupied slots of a [`SlabPool`].
///
/// Skips empty chunks outright and unset bits via word-level scans.
#[derive(Debug)]
pub struct SlabIter<'p, T> {
    chunks: &'p [SlabChunk<T>],
    blocks_per_chunk: usize,
    chunk: usize,
    next_bit: usize,
}

impl<'p, T> Iterator for SlabIter<'p, T> {
    type Item = (usize, &'p T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let chunk = self.chunks.get(self.chunk)?;
            if chunk.occupancy.count_ones() > 0 {
                if let Some(bit) = chunk.occupancy.next_set_from(self.next_bit) {
                    self.next_bit = bit + 1;
                    return Some((self.chunk * self.blocks_per_chunk + bit, &chunk.slots[bit]));
                }
            }
            self.chunk += 1;
            self.next_bit = 0;
        }
    }
}
