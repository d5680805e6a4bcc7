//! # Memory Management
//!
//! Pooled storage built on a single pre-sized arena.
//!
//! ## Layers
//!
//! - [`Arena`]: bump budget that backs every chunk.
//! - [`SlabPool`]: fixed-size slots, grown chunk by chunk.
//! - [`Multimap`]: red/black tree keyed by `u64`, duplicate keys chained.
//! - [`SpanAllocator`]: variable-size spans with best-fit search and coalescing.
//!
//! Chunks are never returned to the arena while their pool lives.

mod arena;
pub mod bitmap;
mod keyed;
mod rbtree;
mod slab;
mod span;

pub use arena::Arena;
pub use keyed::KeyedStore;
pub use rbtree::{Color, InsertOutcome, Iter, Multimap, NodeId, TreeStore, ValueIter};
pub use slab::{SlabIter, SlabPool};
pub use span::{SpanAllocator, SpanStats, SPAN_CHUNK_ALIGN};
