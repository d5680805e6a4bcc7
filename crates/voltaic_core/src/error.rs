//! # Memory Error Types
//!
//! Errors reported by the memory layer.
//!
//! Most misuse of the allocators is a fatal precondition and panics. The
//! variants here cover the few fallible constructors, configuration loading,
//! typed views, and the structural violations found by the verification walks.

use thiserror::Error;

/// Errors that can occur in the memory layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The backing arena could not satisfy a request.
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    ArenaExhausted {
        /// Bytes requested (including alignment padding).
        requested: usize,
        /// Bytes left in the arena.
        remaining: usize,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// A typed view over a span failed (size or alignment mismatch).
    #[error("cannot view span at {addr:#x} as typed data: {reason}")]
    InvalidView {
        /// Base address of the span.
        addr: u64,
        /// Cast failure description.
        reason: String,
    },

    /// The address does not belong to a live allocation.
    #[error("no live allocation at address {0:#x}")]
    UnknownAddress(u64),

    /// The tree root is red.
    #[error("tree root {key} is red")]
    RedRoot {
        /// Key of the root node.
        key: u64,
    },

    /// A red node has a red child.
    #[error("red node {parent} has red child {child}")]
    RedRedEdge {
        /// Key of the red parent.
        parent: u64,
        /// Key of the red child.
        child: u64,
    },

    /// Two paths below a node have different black heights.
    #[error("black height mismatch below {key}: left {left}, right {right}")]
    BlackHeightMismatch {
        /// Key of the node where the paths diverge.
        key: u64,
        /// Black height of the left subtree.
        left: usize,
        /// Black height of the right subtree.
        right: usize,
    },

    /// A child key is on the wrong side of its parent.
    #[error("key order violated: {child} under {parent}")]
    KeyOrder {
        /// Key of the parent node.
        parent: u64,
        /// Key of the misplaced child.
        child: u64,
    },

    /// A child's parent link does not point back at its parent.
    #[error("broken parent link at {key}")]
    ParentLink {
        /// Key of the node with the bad link.
        key: u64,
    },

    /// A node with no values was left in the tree.
    #[error("node {key} has an empty value list")]
    EmptyValueList {
        /// Key of the empty node.
        key: u64,
    },

    /// The number of reachable nodes disagrees with the tracked count.
    #[error("tree tracks {tracked} nodes but {reachable} are reachable")]
    NodeCount {
        /// Count kept by the tree.
        tracked: usize,
        /// Nodes found by the walk.
        reachable: usize,
    },

    /// The number of reachable values disagrees with the tracked count.
    #[error("tree tracks {tracked} values but {reachable} are reachable")]
    ValueCount {
        /// Count kept by the tree.
        tracked: usize,
        /// Values found by the walk.
        reachable: usize,
    },

    /// A span does not start where its predecessor ends.
    #[error("span at {found:#x} in chunk {chunk} should start at {expected:#x}")]
    SpanDiscontiguous {
        /// Chunk index.
        chunk: u32,
        /// Expected base address.
        expected: u64,
        /// Actual base address.
        found: u64,
    },

    /// The spans of a chunk do not add up to the chunk size.
    #[error("chunk {chunk} spans cover {covered} bytes, chunk size is {chunk_size}")]
    ChunkSizeMismatch {
        /// Chunk index.
        chunk: u32,
        /// Bytes covered by the chain.
        covered: u64,
        /// Configured chunk size.
        chunk_size: u64,
    },

    /// Two address-adjacent spans are both free.
    #[error("adjacent free spans at {first:#x} and {second:#x}")]
    AdjacentFreeSpans {
        /// Base of the first span.
        first: u64,
        /// Base of the second span.
        second: u64,
    },

    /// A span and the index trees disagree about its state.
    #[error("span at {addr:#x} is not indexed consistently: {reason}")]
    IndexMismatch {
        /// Base address of the span.
        addr: u64,
        /// What disagreed.
        reason: &'static str,
    },
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
