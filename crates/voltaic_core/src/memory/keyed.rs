//! # Keyed Store
//!
//! A [`Multimap`] bundled with its own [`TreeStore`], for callers that want
//! keyed multimap storage without the span allocator's coalescing.

use super::arena::Arena;
use super::rbtree::{Iter, Multimap, TreeStore, ValueIter};
use crate::error::MemoryResult;

/// Keyed multimap with pooled node and value storage.
///
/// # Example
///
/// ```rust
/// use voltaic_core::{Arena, KeyedStore};
///
/// let arena = Arena::new(64 * 1024);
/// let mut store: KeyedStore<'_, &str> = KeyedStore::new(&arena, 32);
///
/// store.insert(3, "gate");
/// store.insert(3, "wire");
/// assert_eq!(store.first(3), Some(&"wire"));
/// assert_eq!(store.get(3).count(), 2);
/// ```
#[derive(Debug)]
pub struct KeyedStore<'a, V> {
    store: TreeStore<'a, V>,
    tree: Multimap<V>,
}

impl<'a, V: Default> KeyedStore<'a, V> {
    /// Creates an empty store whose pools grow `blocks_per_chunk` entries at a time.
    ///
    /// # Panics
    ///
    /// Panics if `blocks_per_chunk` is zero or the arena is exhausted.
    #[must_use]
    pub fn new(arena: &'a Arena, blocks_per_chunk: usize) -> Self {
        Self {
            store: TreeStore::new(arena, blocks_per_chunk, blocks_per_chunk),
            tree: Multimap::new(),
        }
    }

    /// Creates an empty store, reporting arena exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::ArenaExhausted`] if the first chunks do not fit.
    pub fn try_new(arena: &'a Arena, blocks_per_chunk: usize) -> MemoryResult<Self> {
        Ok(Self {
            store: TreeStore::try_new(arena, blocks_per_chunk, blocks_per_chunk)?,
            tree: Multimap::new(),
        })
    }

    /// Adds a value under `key`, ahead of any values already there.
    ///
    /// # Returns
    ///
    /// True if `key` was new.
    pub fn insert(&mut self, key: u64, value: V) -> bool {
        self.tree.insert(&mut self.store, key, value).created
    }

    /// Removes `key` with all of its values.
    ///
    /// # Returns
    ///
    /// False if the key was absent.
    pub fn remove_key(&mut self, key: u64) -> bool {
        self.tree.delete(&mut self.store, key)
    }

    /// Removes and returns every value of `key`, most recent first.
    pub fn drain_key(&mut self, key: u64) -> Vec<V> {
        let Some(node) = self.tree.find(&self.store, key) else {
            return Vec::new();
        };
        let mut drained = Vec::with_capacity(self.store.value_len(node));
        while let Some(value) = self.tree.pop_value(&mut self.store, node) {
            drained.push(value);
        }
        self.tree.remove_node(&mut self.store, node);
        drained
    }

    /// Removes one value from `key`, dropping the key once it has none left.
    ///
    /// # Returns
    ///
    /// The removed value, or None if `key` did not hold it.
    pub fn remove_value(&mut self, key: u64, value: &V) -> Option<V>
    where
        V: PartialEq,
    {
        let node = self.tree.find(&self.store, key)?;
        let removed = self.tree.remove_single_value(&mut self.store, node, value)?;
        if self.store.value_len(node) == 0 {
            self.tree.remove_node(&mut self.store, node);
        }
        Some(removed)
    }
}

impl<'a, V> KeyedStore<'a, V> {
    /// Values of `key`, most recent first. Empty if the key is absent.
    #[must_use]
    pub fn get(&self, key: u64) -> impl Iterator<Item = &V> + '_ {
        self.tree
            .find(&self.store, key)
            .map(|node| self.store.values(node))
            .into_iter()
            .flatten()
    }

    /// Most recent value of `key`.
    #[must_use]
    pub fn first(&self, key: u64) -> Option<&V> {
        let node = self.tree.find(&self.store, key)?;
        self.store.first_value(node)
    }

    /// True if `key` holds at least one value.
    #[must_use]
    pub fn contains_key(&self, key: u64) -> bool {
        self.tree.find(&self.store, key).is_some()
    }

    /// Number of distinct keys.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// True if no key is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Number of values across all keys.
    #[inline]
    #[must_use]
    pub const fn value_count(&self) -> usize {
        self.tree.value_count()
    }

    /// Ascending iterator over `(key, values)`.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        self.tree.iter(&self.store)
    }

    /// Visits every key in ascending order without allocating.
    pub fn for_each<F>(&mut self, visit: F)
    where
        F: FnMut(u64, ValueIter<'_, V>),
    {
        self.tree.for_each_in_order(&mut self.store, visit);
    }

    /// Checks the underlying tree.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation found.
    pub fn check_invariants(&self) -> MemoryResult<()> {
        self.tree.check_invariants(&self.store)
    }
}
