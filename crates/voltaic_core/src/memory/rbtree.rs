//! # Balanced Multimap
//!
//! Red/black tree keyed by `u64` where every key owns a non-empty list of
//! values, most recently inserted first. Inserting an existing key only
//! prepends to that key's list; the tree shape does not change.
//!
//! Nodes and value entries live in two [`SlabPool`]s bundled as a
//! [`TreeStore`]. The tree itself is just a root and counters, so several
//! trees can share one store (the span allocator keeps two trees over one
//! store). Every operation takes the store explicitly.
//!
//! ## Invariants
//!
//! - The root is black.
//! - A red node never has a red child.
//! - Every root-to-leaf path crosses the same number of black nodes.
//! - No node with an empty value list stays in the tree.

use std::cmp::Ordering;
use std::marker::PhantomData;

use super::arena::Arena;
use super::slab::SlabPool;
use crate::error::{MemoryError, MemoryResult};

/// Index of a tree node inside its [`TreeStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => Self(index),
            Err(_) => panic!("tree node index {index} overflows u32"),
        }
    }

    /// Slot index of the node.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a value entry inside its [`TreeStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ValueId(u32);

impl ValueId {
    fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => Self(index),
            Err(_) => panic!("tree value index {index} overflows u32"),
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Color {
    /// New nodes start red.
    #[default]
    Red,
    /// Black nodes count toward the black height.
    Black,
}

/// Head of a key's value list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ValueList {
    head: Option<ValueId>,
    len: usize,
}

#[derive(Debug, Default)]
struct ValueEntry<V> {
    value: V,
    next: Option<ValueId>,
}

#[derive(Debug, Default)]
struct TreeNode {
    key: u64,
    color: Color,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    values: ValueList,
}

/// Node and value storage shared by one or more [`Multimap`]s.
#[derive(Debug)]
pub struct TreeStore<'a, V> {
    nodes: SlabPool<'a, TreeNode>,
    values: SlabPool<'a, ValueEntry<V>>,
}

impl<'a, V: Default> TreeStore<'a, V> {
    /// Creates a store with one chunk of nodes and one chunk of values.
    ///
    /// # Panics
    ///
    /// Panics if either chunk size is zero or the arena is exhausted.
    #[must_use]
    pub fn new(arena: &'a Arena, nodes_per_chunk: usize, values_per_chunk: usize) -> Self {
        Self {
            nodes: SlabPool::new(arena, nodes_per_chunk),
            values: SlabPool::new(arena, values_per_chunk),
        }
    }

    /// Creates a store, reporting arena exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ArenaExhausted`] if the first chunks do not fit.
    pub fn try_new(
        arena: &'a Arena,
        nodes_per_chunk: usize,
        values_per_chunk: usize,
    ) -> MemoryResult<Self> {
        Ok(Self {
            nodes: SlabPool::try_new(arena, nodes_per_chunk)?,
            values: SlabPool::try_new(arena, values_per_chunk)?,
        })
    }

    fn alloc_node(&mut self, key: u64, parent: Option<NodeId>, value: V) -> NodeId {
        let head = ValueId::from_index(self.values.push(ValueEntry { value, next: None }));
        NodeId::from_index(self.nodes.push(TreeNode {
            key,
            color: Color::Red,
            parent,
            left: None,
            right: None,
            values: ValueList {
                head: Some(head),
                len: 1,
            },
        }))
    }

    fn prepend_value(&mut self, node: NodeId, value: V) {
        let list = self.node(node).values;
        let head = ValueId::from_index(self.values.push(ValueEntry {
            value,
            next: list.head,
        }));
        self.node_mut(node).values = ValueList {
            head: Some(head),
            len: list.len + 1,
        };
    }

    fn pop_front(&mut self, node: NodeId) -> Option<V> {
        let list = self.node(node).values;
        let head = list.head?;
        let entry = self.values.free(head.index());
        self.node_mut(node).values = ValueList {
            head: entry.next,
            len: list.len - 1,
        };
        Some(entry.value)
    }

    fn remove_value(&mut self, node: NodeId, value: &V) -> Option<V>
    where
        V: PartialEq,
    {
        let mut prev: Option<ValueId> = None;
        let mut cur = self.node(node).values.head;
        while let Some(id) = cur {
            let entry = self.entry(id);
            let next = entry.next;
            if entry.value == *value {
                match prev {
                    None => self.node_mut(node).values.head = next,
                    Some(prev) => self.entry_mut(prev).next = next,
                }
                self.node_mut(node).values.len -= 1;
                return Some(self.values.free(id.index()).value);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    fn free_values(&mut self, list: ValueList) {
        let mut cur = list.head;
        while let Some(id) = cur {
            cur = self.values.free(id.index()).next;
        }
    }

    fn free_node(&mut self, node: NodeId) {
        self.nodes.free(node.index());
    }
}

impl<'a, V> TreeStore<'a, V> {
    /// Nodes currently stored across all trees.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.allocated_count()
    }

    /// Values currently stored across all trees.
    #[inline]
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.allocated_count()
    }

    /// Key of a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    #[inline]
    #[must_use]
    pub fn key(&self, node: NodeId) -> u64 {
        self.node(node).key
    }

    /// Color of a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    #[inline]
    #[must_use]
    pub fn color(&self, node: NodeId) -> Color {
        self.node(node).color
    }

    /// Values of a node, most recently inserted first.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    #[must_use]
    pub fn values(&self, node: NodeId) -> ValueIter<'_, V> {
        ValueIter {
            values: &self.values,
            next: self.node(node).values.head,
            remaining: self.node(node).values.len,
        }
    }

    /// The most recently inserted value of a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    #[must_use]
    pub fn first_value(&self, node: NodeId) -> Option<&V> {
        self.values(node).next()
    }

    /// Number of values held by a node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    #[inline]
    #[must_use]
    pub fn value_len(&self, node: NodeId) -> usize {
        self.node(node).values.len
    }

    fn node(&self, id: NodeId) -> &TreeNode {
        match self.nodes.get(id.index()) {
            Some(node) => node,
            None => panic!("dangling tree node {}", id.0),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        match self.nodes.get_mut(id.index()) {
            Some(node) => node,
            None => panic!("dangling tree node {}", id.0),
        }
    }

    fn entry(&self, id: ValueId) -> &ValueEntry<V> {
        match self.values.get(id.index()) {
            Some(entry) => entry,
            None => panic!("dangling tree value {}", id.0),
        }
    }

    fn entry_mut(&mut self, id: ValueId) -> &mut ValueEntry<V> {
        match self.values.get_mut(id.index()) {
            Some(entry) => entry,
            None => panic!("dangling tree value {}", id.0),
        }
    }

    #[inline]
    fn left(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).left
    }

    #[inline]
    fn right(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).right
    }

    #[inline]
    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Missing children count as black.
    #[inline]
    fn is_red(&self, id: Option<NodeId>) -> bool {
        id.map_or(false, |id| self.node(id).color == Color::Red)
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).color = color;
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.left(id) {
            id = left;
        }
        id
    }

    fn rightmost(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.right(id) {
            id = right;
        }
        id
    }

    /// First node of a subtree in post-order.
    fn deepest_first(&self, mut id: NodeId) -> NodeId {
        loop {
            let node = self.node(id);
            match (node.left, node.right) {
                (Some(left), _) => id = left,
                (None, Some(right)) => id = right,
                (None, None) => return id,
            }
        }
    }

    fn successor(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.right(id) {
            return Some(self.leftmost(right));
        }
        let mut child = id;
        while let Some(parent) = self.parent(child) {
            if self.left(parent) == Some(child) {
                return Some(parent);
            }
            child = parent;
        }
        None
    }
}

/// Iterator over one key's values, most recent first.
#[derive(Debug)]
pub struct ValueIter<'s, V> {
    values: &'s SlabPool<'s, ValueEntry<V>>,
    next: Option<ValueId>,
    remaining: usize,
}

impl<'s, V> Iterator for ValueIter<'s, V> {
    type Item = &'s V;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.values.get(id.index())?;
        self.next = entry.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(&entry.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Result of [`Multimap::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Node now holding the value.
    pub node: NodeId,
    /// False if the key already existed and the value was chained onto it.
    pub created: bool,
}

/// Red/black multimap over a [`TreeStore`].
///
/// # Example
///
/// ```rust
/// use voltaic_core::{Arena, Multimap, TreeStore};
///
/// let arena = Arena::new(64 * 1024);
/// let mut store: TreeStore<'_, u32> = TreeStore::new(&arena, 32, 32);
/// let mut tree = Multimap::new();
///
/// tree.insert(&mut store, 10, 1);
/// tree.insert(&mut store, 10, 2);
/// tree.insert(&mut store, 5, 3);
///
/// let node = tree.find(&store, 10).unwrap();
/// let values: Vec<u32> = store.values(node).copied().collect();
/// assert_eq!(values, vec![2, 1]);
/// assert_eq!(tree.len(), 2);
/// ```
#[derive(Debug)]
pub struct Multimap<V> {
    root: Option<NodeId>,
    len: usize,
    value_count: usize,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Default for Multimap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Multimap<V> {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            len: 0,
            value_count: 0,
            _marker: PhantomData,
        }
    }

    /// Number of nodes (distinct keys).
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if the tree holds no keys.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of values across all keys.
    #[inline]
    #[must_use]
    pub const fn value_count(&self) -> usize {
        self.value_count
    }

    /// Root node, if any.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Finds the node holding `key`.
    #[must_use]
    pub fn find(&self, store: &TreeStore<'_, V>, key: u64) -> Option<NodeId> {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = store.node(id);
            cur = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    /// Finds the node with the smallest key not below `key`.
    ///
    /// Descends right while the key is too small and left while it is
    /// adequate, remembering the last adequate node.
    #[must_use]
    pub fn lower_bound(&self, store: &TreeStore<'_, V>, key: u64) -> Option<NodeId> {
        let mut best = None;
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = store.node(id);
            if node.key < key {
                cur = node.right;
            } else {
                best = Some(id);
                if node.key == key {
                    break;
                }
                cur = node.left;
            }
        }
        best
    }

    /// Node with the smallest key.
    #[must_use]
    pub fn first(&self, store: &TreeStore<'_, V>) -> Option<NodeId> {
        self.root.map(|root| store.leftmost(root))
    }

    /// Node with the largest key.
    #[must_use]
    pub fn last(&self, store: &TreeStore<'_, V>) -> Option<NodeId> {
        self.root.map(|root| store.rightmost(root))
    }

    /// Ascending iterator over `(key, values)`, walking parent links.
    #[must_use]
    pub fn iter<'s>(&self, store: &'s TreeStore<'_, V>) -> Iter<'s, V> {
        Iter {
            store,
            next: self.first(store),
            remaining: self.len,
        }
    }

    /// Visits every node in ascending key order.
    ///
    /// Threads the unused right links of in-order predecessors while
    /// descending and restores them on the way back, so no stack is needed.
    /// The store is borrowed mutably for the whole walk, which rules out
    /// touching the tree from inside `visit`.
    pub fn for_each_in_order<F>(&self, store: &mut TreeStore<'_, V>, mut visit: F)
    where
        F: FnMut(u64, ValueIter<'_, V>),
    {
        let mut cur = self.root;
        while let Some(id) = cur {
            let Some(left) = store.left(id) else {
                visit(store.key(id), store.values(id));
                cur = store.right(id);
                continue;
            };

            let mut pred = left;
            while let Some(right) = store.right(pred) {
                if right == id {
                    break;
                }
                pred = right;
            }

            if store.right(pred) == Some(id) {
                store.node_mut(pred).right = None;
                visit(store.key(id), store.values(id));
                cur = store.right(id);
            } else {
                store.node_mut(pred).right = Some(id);
                cur = Some(left);
            }
        }
    }

    /// Visits every node with children before parents.
    pub fn for_each_post_order<F>(&self, store: &TreeStore<'_, V>, mut visit: F)
    where
        F: FnMut(u64, ValueIter<'_, V>),
    {
        let Some(root) = self.root else {
            return;
        };
        let mut cur = store.deepest_first(root);
        loop {
            visit(store.key(cur), store.values(cur));
            if cur == root {
                break;
            }
            let Some(parent) = store.parent(cur) else {
                break;
            };
            cur = match store.right(parent) {
                Some(right) if store.left(parent) == Some(cur) => store.deepest_first(right),
                _ => parent,
            };
        }
    }

    /// Visits every node parent-first, using `stack` as scratch space.
    ///
    /// # Panics
    ///
    /// Panics if `stack` is shorter than [`Multimap::len`].
    pub fn for_each_pre_order<F>(&self, store: &TreeStore<'_, V>, stack: &mut [NodeId], mut visit: F)
    where
        F: FnMut(u64, ValueIter<'_, V>),
    {
        assert!(
            stack.len() >= self.len,
            "pre-order stack holds {} entries, tree has {} nodes",
            stack.len(),
            self.len
        );
        let Some(root) = self.root else {
            return;
        };

        stack[0] = root;
        let mut depth = 1;
        while depth > 0 {
            depth -= 1;
            let id = stack[depth];
            visit(store.key(id), store.values(id));
            if let Some(right) = store.right(id) {
                stack[depth] = right;
                depth += 1;
            }
            if let Some(left) = store.left(id) {
                stack[depth] = left;
                depth += 1;
            }
        }
    }

    /// Checks the red/black, ordering, linkage and count invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self, store: &TreeStore<'_, V>) -> MemoryResult<()> {
        let Some(root) = self.root else {
            if self.len != 0 {
                return Err(MemoryError::NodeCount {
                    tracked: self.len,
                    reachable: 0,
                });
            }
            return Ok(());
        };

        let root_node = store.node(root);
        if root_node.parent.is_some() {
            return Err(MemoryError::ParentLink { key: root_node.key });
        }
        if root_node.color == Color::Red {
            return Err(MemoryError::RedRoot { key: root_node.key });
        }

        let mut counts = (0, 0);
        check_subtree(store, root, None, None, &mut counts)?;

        let (nodes, values) = counts;
        if nodes != self.len {
            return Err(MemoryError::NodeCount {
                tracked: self.len,
                reachable: nodes,
            });
        }
        if values != self.value_count {
            return Err(MemoryError::ValueCount {
                tracked: self.value_count,
                reachable: values,
            });
        }
        Ok(())
    }

    /// Asserts [`Multimap::check_invariants`] in debug builds.
    ///
    /// # Panics
    ///
    /// Panics on any violation when debug assertions are enabled.
    #[inline]
    pub fn debug_verify(&self, store: &TreeStore<'_, V>) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.check_invariants(store) {
                panic!("multimap invariant violated: {err}");
            }
        }
    }

    fn replace_child(
        &mut self,
        store: &mut TreeStore<'_, V>,
        parent: Option<NodeId>,
        old: NodeId,
        new: Option<NodeId>,
    ) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                let node = store.node_mut(parent);
                if node.left == Some(old) {
                    node.left = new;
                } else {
                    node.right = new;
                }
            }
        }
    }

    fn rotate_left(&mut self, store: &mut TreeStore<'_, V>, x: NodeId) {
        let Some(y) = store.right(x) else {
            unreachable!("left rotation at {} without a right child", x.0);
        };
        let inner = store.left(y);
        store.node_mut(x).right = inner;
        if let Some(inner) = inner {
            store.node_mut(inner).parent = Some(x);
        }
        let parent = store.parent(x);
        store.node_mut(y).parent = parent;
        self.replace_child(store, parent, x, Some(y));
        store.node_mut(y).left = Some(x);
        store.node_mut(x).parent = Some(y);
    }

    fn rotate_right(&mut self, store: &mut TreeStore<'_, V>, x: NodeId) {
        let Some(y) = store.left(x) else {
            unreachable!("right rotation at {} without a left child", x.0);
        };
        let inner = store.right(y);
        store.node_mut(x).left = inner;
        if let Some(inner) = inner {
            store.node_mut(inner).parent = Some(x);
        }
        let parent = store.parent(x);
        store.node_mut(y).parent = parent;
        self.replace_child(store, parent, x, Some(y));
        store.node_mut(y).right = Some(x);
        store.node_mut(x).parent = Some(y);
    }
}

impl<V: Default> Multimap<V> {
    /// Inserts `value` under `key`.
    ///
    /// An existing key gets the value prepended to its list with no
    /// structural change; otherwise a red leaf is added and the tree rebalanced.
    ///
    /// # Panics
    ///
    /// Panics if the store has to grow and the arena is exhausted.
    pub fn insert(&mut self, store: &mut TreeStore<'_, V>, key: u64, value: V) -> InsertOutcome {
        let mut parent = None;
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = store.node(id);
            cur = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => {
                    store.prepend_value(id, value);
                    self.value_count += 1;
                    return InsertOutcome {
                        node: id,
                        created: false,
                    };
                }
            };
            parent = Some(id);
        }

        let id = store.alloc_node(key, parent, value);
        match parent {
            None => self.root = Some(id),
            Some(parent) => {
                let node = store.node_mut(parent);
                if key < node.key {
                    node.left = Some(id);
                } else {
                    node.right = Some(id);
                }
            }
        }
        self.len += 1;
        self.value_count += 1;

        self.insert_fixup(store, id);
        InsertOutcome {
            node: id,
            created: true,
        }
    }

    /// Removes `key` and all of its values.
    ///
    /// # Returns
    ///
    /// False if the key was absent.
    pub fn delete(&mut self, store: &mut TreeStore<'_, V>, key: u64) -> bool {
        match self.find(store, key) {
            Some(node) => {
                self.remove_node(store, node);
                true
            }
            None => false,
        }
    }

    /// Removes a node and all of its values.
    ///
    /// A node with two children takes over its in-order predecessor's key and
    /// values, and the predecessor is unlinked instead, so any [`NodeId`]
    /// held for the predecessor is invalid afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a live node.
    pub fn remove_node(&mut self, store: &mut TreeStore<'_, V>, node: NodeId) {
        let doomed = std::mem::take(&mut store.node_mut(node).values);
        self.value_count -= doomed.len;
        store.free_values(doomed);

        let target = match (store.left(node), store.right(node)) {
            (Some(left), Some(_)) => {
                let pred = store.rightmost(left);
                let pred_node = store.node_mut(pred);
                let key = pred_node.key;
                let values = std::mem::take(&mut pred_node.values);
                let node_mut = store.node_mut(node);
                node_mut.key = key;
                node_mut.values = values;
                pred
            }
            _ => node,
        };

        let child = store.left(target).or(store.right(target));
        let parent = store.parent(target);
        if let Some(child) = child {
            store.node_mut(child).parent = parent;
        }
        self.replace_child(store, parent, target, child);

        let removed_color = store.color(target);
        store.free_node(target);
        self.len -= 1;

        if removed_color == Color::Black {
            match child {
                Some(child) if store.is_red(Some(child)) => store.set_color(child, Color::Black),
                _ => self.delete_fixup(store, child, parent),
            }
        }
    }

    /// Removes one specific value from a node's list, leaving the tree shape alone.
    ///
    /// The caller deletes the node if its list becomes empty.
    ///
    /// # Returns
    ///
    /// The removed value, or None if the node did not hold it.
    pub fn remove_single_value(
        &mut self,
        store: &mut TreeStore<'_, V>,
        node: NodeId,
        value: &V,
    ) -> Option<V>
    where
        V: PartialEq,
    {
        let removed = store.remove_value(node, value);
        if removed.is_some() {
            self.value_count -= 1;
        }
        removed
    }

    /// Removes the most recently inserted value of a node, leaving the tree shape alone.
    ///
    /// The caller deletes the node if its list becomes empty.
    pub fn pop_value(&mut self, store: &mut TreeStore<'_, V>, node: NodeId) -> Option<V> {
        let popped = store.pop_front(node);
        if popped.is_some() {
            self.value_count -= 1;
        }
        popped
    }

    fn insert_fixup(&mut self, store: &mut TreeStore<'_, V>, mut node: NodeId) {
        while let Some(parent) = store.parent(node) {
            if !store.is_red(Some(parent)) {
                break;
            }
            // A red parent is never the root, so the grandparent exists.
            let Some(grand) = store.parent(parent) else {
                break;
            };

            if store.left(grand) == Some(parent) {
                let uncle = store.right(grand);
                if let Some(uncle) = uncle.filter(|&uncle| store.is_red(Some(uncle))) {
                    store.set_color(parent, Color::Black);
                    store.set_color(uncle, Color::Black);
                    store.set_color(grand, Color::Red);
                    node = grand;
                    continue;
                }
                let parent = if store.right(parent) == Some(node) {
                    self.rotate_left(store, parent);
                    node
                } else {
                    parent
                };
                store.set_color(parent, Color::Black);
                store.set_color(grand, Color::Red);
                self.rotate_right(store, grand);
            } else {
                let uncle = store.left(grand);
                if let Some(uncle) = uncle.filter(|&uncle| store.is_red(Some(uncle))) {
                    store.set_color(parent, Color::Black);
                    store.set_color(uncle, Color::Black);
                    store.set_color(grand, Color::Red);
                    node = grand;
                    continue;
                }
                let parent = if store.left(parent) == Some(node) {
                    self.rotate_right(store, parent);
                    node
                } else {
                    parent
                };
                store.set_color(parent, Color::Black);
                store.set_color(grand, Color::Red);
                self.rotate_left(store, grand);
            }
            break;
        }

        if let Some(root) = self.root {
            store.set_color(root, Color::Black);
        }
    }

    /// Resolves a double-black at `node` (possibly empty) under `parent`.
    fn delete_fixup(
        &mut self,
        store: &mut TreeStore<'_, V>,
        mut node: Option<NodeId>,
        mut parent: Option<NodeId>,
    ) {
        while node != self.root && !store.is_red(node) {
            let Some(p) = parent else {
                break;
            };

            if store.left(p) == node {
                let Some(mut sibling) = store.right(p) else {
                    break;
                };
                if store.is_red(Some(sibling)) {
                    store.set_color(sibling, Color::Black);
                    store.set_color(p, Color::Red);
                    self.rotate_left(store, p);
                    let Some(next) = store.right(p) else {
                        break;
                    };
                    sibling = next;
                }

                let near = store.left(sibling);
                let far = store.right(sibling);
                if !store.is_red(near) && !store.is_red(far) {
                    store.set_color(sibling, Color::Red);
                    node = Some(p);
                    parent = store.parent(p);
                    continue;
                }

                if !store.is_red(far) {
                    if let Some(near) = near {
                        store.set_color(near, Color::Black);
                    }
                    store.set_color(sibling, Color::Red);
                    self.rotate_right(store, sibling);
                    let Some(next) = store.right(p) else {
                        break;
                    };
                    sibling = next;
                }

                store.set_color(sibling, store.color(p));
                store.set_color(p, Color::Black);
                if let Some(far) = store.right(sibling) {
                    store.set_color(far, Color::Black);
                }
                self.rotate_left(store, p);
            } else {
                let Some(mut sibling) = store.left(p) else {
                    break;
                };
                if store.is_red(Some(sibling)) {
                    store.set_color(sibling, Color::Black);
                    store.set_color(p, Color::Red);
                    self.rotate_right(store, p);
                    let Some(next) = store.left(p) else {
                        break;
                    };
                    sibling = next;
                }

                let near = store.right(sibling);
                let far = store.left(sibling);
                if !store.is_red(near) && !store.is_red(far) {
                    store.set_color(sibling, Color::Red);
                    node = Some(p);
                    parent = store.parent(p);
                    continue;
                }

                if !store.is_red(far) {
                    if let Some(near) = near {
                        store.set_color(near, Color::Black);
                    }
                    store.set_color(sibling, Color::Red);
                    self.rotate_left(store, sibling);
                    let Some(next) = store.left(p) else {
                        break;
                    };
                    sibling = next;
                }

                store.set_color(sibling, store.color(p));
                store.set_color(p, Color::Black);
                if let Some(far) = store.left(sibling) {
                    store.set_color(far, Color::Black);
                }
                self.rotate_right(store, p);
            }
            node = self.root;
            break;
        }

        if let Some(node) = node {
            store.set_color(node, Color::Black);
        }
    }
}

/// Walks a subtree, returning its black height.
fn check_subtree<V>(
    store: &TreeStore<'_, V>,
    id: NodeId,
    lower: Option<u64>,
    upper: Option<u64>,
    counts: &mut (usize, usize),
) -> MemoryResult<usize> {
    let node = store.node(id);
    counts.0 += 1;

    let listed = store.values(id).count();
    if listed == 0 || listed != node.values.len {
        return Err(MemoryError::EmptyValueList { key: node.key });
    }
    counts.1 += listed;

    let mut heights = [0usize; 2];
    for (side, child) in [node.left, node.right].into_iter().enumerate() {
        let Some(child) = child else {
            continue;
        };
        let child_node = store.node(child);
        if child_node.parent != Some(id) {
            return Err(MemoryError::ParentLink { key: child_node.key });
        }
        let misplaced = if side == 0 {
            child_node.key >= node.key || lower.is_some_and(|lower| child_node.key <= lower)
        } else {
            child_node.key <= node.key || upper.is_some_and(|upper| child_node.key >= upper)
        };
        if misplaced {
            return Err(MemoryError::KeyOrder {
                parent: node.key,
                child: child_node.key,
            });
        }
        if node.color == Color::Red && child_node.color == Color::Red {
            return Err(MemoryError::RedRedEdge {
                parent: node.key,
                child: child_node.key,
            });
        }
        heights[side] = if side == 0 {
            check_subtree(store, child, lower, Some(node.key), counts)?
        } else {
            check_subtree(store, child, Some(node.key), upper, counts)?
        };
    }

    if heights[0] != heights[1] {
        return Err(MemoryError::BlackHeightMismatch {
            key: node.key,
            left: heights[0],
            right: heights[1],
        });
    }
    Ok(heights[0] + usize::from(node.color == Color::Black))
}

/// Ascending iterator over a [`Multimap`].
#[derive(Debug)]
pub struct Iter<'s, V> {
    store: &'s TreeStore<'s, V>,
    next: Option<NodeId>,
    remaining: usize,
}

impl<'s, V> Iterator for Iter<'s, V> {
    type Item = (u64, ValueIter<'s, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.store.successor(id);
        self.remaining = self.remaining.saturating_sub(1);
        Some((self.store.key(id), self.store.values(id)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
