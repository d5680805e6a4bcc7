//! # Voltaic Core Memory
//!
//! Allocation primitives for the engine, all carved from one arena
//! sized at startup:
//! - Slab pools of fixed-size slots with occupancy bitmaps
//! - A red/black multimap keyed by `u64` with LIFO duplicate chains
//! - A span allocator with best-fit search and address coalescing
//!
//! ## Architecture Rules
//!
//! 1. **One budget** - Every chunk comes from the [`Arena`]
//! 2. **Indices, not pointers** - Nodes and spans refer to each other by slot index
//! 3. **Misuse is fatal** - Double frees and bad sizes panic; only construction,
//!    configuration and typed views return errors
//!
//! ## Example
//!
//! ```rust
//! use voltaic_core::{MemoryConfig, SpanAllocator};
//!
//! let config = MemoryConfig::default();
//! let arena = config.build_arena();
//! let mut spans = SpanAllocator::from_config(&arena, &config).unwrap();
//!
//! let addr = spans.allocate(128);
//! assert_eq!(spans.size_of(addr), Some(128));
//! spans.free(addr);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;

pub use config::MemoryConfig;
pub use error::{MemoryError, MemoryResult};
pub use memory::{
    Arena, Color, InsertOutcome, Iter, KeyedStore, Multimap, NodeId, SlabIter, SlabPool,
    SpanAllocator, SpanStats, TreeStore, ValueIter,
};
