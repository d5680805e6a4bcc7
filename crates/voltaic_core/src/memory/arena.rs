//! # Arena Allocator
//!
//! A bump allocator that every pool in the memory layer draws its storage from.
//! There is no individual free: blocks live as long as their owner, and the
//! budget is only rewound by [`Arena::reset`].

use std::cell::Cell;

use crate::error::{MemoryError, MemoryResult};

/// A bump-pointer arena allocator.
///
/// Allocations are fast (just bump an offset). Handed-out blocks are boxed,
/// so their addresses stay stable for as long as they are held.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Use one arena per thread.
///
/// # Example
///
/// ```rust
/// use voltaic_core::Arena;
///
/// let arena = Arena::new(1024 * 1024); // 1MB
///
/// // Fast allocations
/// let data = arena.alloc_slice::<f32>(1000).unwrap();
/// assert_eq!(data.len(), 1000);
/// assert!(arena.used() >= 4000);
/// ```
#[derive(Debug)]
pub struct Arena {
    /// Current allocation offset.
    offset: Cell<usize>,
    /// Number of blocks handed out since the last reset.
    allocations: Cell<usize>,
    /// Total capacity.
    capacity: usize,
}

impl Arena {
    /// Creates a new arena with the specified capacity in bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            offset: Cell::new(0),
            allocations: Cell::new(0),
            capacity,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current used space in bytes.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used()
    }

    /// Returns how many blocks were handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocations.get()
    }

    /// Allocates a slice of `count` default-initialized elements.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of elements
    ///
    /// # Returns
    ///
    /// The boxed slice, or None if out of space.
    pub fn alloc_slice<T: Default>(&self, count: usize) -> Option<Box<[T]>> {
        self.try_alloc_slice(count).ok()
    }

    /// Allocates `byte_count` zeroed bytes.
    pub fn allocate_raw(&self, byte_count: usize) -> Option<Box<[u8]>> {
        self.alloc_slice::<u8>(byte_count)
    }

    /// Like [`Arena::alloc_slice`], but reports how far the budget fell short.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ArenaExhausted`] if the aligned request does not fit.
    pub fn try_alloc_slice<T: Default>(&self, count: usize) -> MemoryResult<Box<[T]>> {
        if count == 0 {
            return Ok(Box::default());
        }

        let size = std::mem::size_of::<T>().saturating_mul(count);
        let align = std::mem::align_of::<T>();

        let offset = self.offset.get();
        let aligned_offset = (offset + align - 1) & !(align - 1);
        let new_offset = aligned_offset.checked_add(size).unwrap_or(usize::MAX);

        if new_offset > self.capacity {
            return Err(MemoryError::ArenaExhausted {
                requested: new_offset.saturating_sub(offset),
                remaining: self.remaining(),
            });
        }

        self.offset.set(new_offset);
        self.allocations.set(self.allocations.get() + 1);

        Ok((0..count).map(|_| T::default()).collect())
    }

    /// Resets the arena budget.
    ///
    /// Takes `&mut self`, so no pool can still be drawing from the arena.
    #[inline]
    pub fn reset(&mut self) {
        self.offset.set(0);
        self.allocations.set(0);
    }
}
