//! # Memory Configuration
//!
//! Sizing for the arena and the allocators built on it. Loaded once at
//! startup from TOML:
//!
//! ```toml
//! arena_bytes = 67108864
//! span_chunk_size = 65536
//! expected_span_count = 1024
//! slab_blocks_per_chunk = 64
//! ```
//!
//! Missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::{Arena, SPAN_CHUNK_ALIGN};

/// Default arena size (64 MiB).
pub const DEFAULT_ARENA_BYTES: usize = 64 * 1024 * 1024;

/// Default span chunk size (64 KiB).
pub const DEFAULT_SPAN_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of span records per bookkeeping chunk.
pub const DEFAULT_EXPECTED_SPAN_COUNT: usize = 1024;

/// Default slab blocks per chunk.
pub const DEFAULT_SLAB_BLOCKS_PER_CHUNK: usize = 64;

/// Memory layer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Total bytes the arena may hand out.
    pub arena_bytes: usize,
    /// Bytes per span allocator chunk.
    pub span_chunk_size: usize,
    /// Span records the allocator's bookkeeping grows by.
    pub expected_span_count: usize,
    /// Blocks per chunk for standalone slab pools.
    pub slab_blocks_per_chunk: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES,
            span_chunk_size: DEFAULT_SPAN_CHUNK_SIZE,
            expected_span_count: DEFAULT_EXPECTED_SPAN_COUNT,
            slab_blocks_per_chunk: DEFAULT_SLAB_BLOCKS_PER_CHUNK,
        }
    }
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConfigParse`] for malformed TOML and
    /// [`MemoryError::InvalidConfig`] for unusable values.
    pub fn from_toml_str(source: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| MemoryError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConfigParse`] if serialization fails.
    pub fn to_toml_string(&self) -> MemoryResult<String> {
        toml::to_string(self).map_err(|err| MemoryError::ConfigParse(err.to_string()))
    }

    /// Checks that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> MemoryResult<()> {
        let nonzero = [
            ("arena_bytes", self.arena_bytes),
            ("span_chunk_size", self.span_chunk_size),
            ("expected_span_count", self.expected_span_count),
            ("slab_blocks_per_chunk", self.slab_blocks_per_chunk),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(MemoryError::InvalidConfig(format!(
                "{field} must be greater than zero"
            )));
        }
        if self.span_chunk_size % SPAN_CHUNK_ALIGN != 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "span_chunk_size {} must be a multiple of {SPAN_CHUNK_ALIGN}",
                self.span_chunk_size
            )));
        }
        if self.span_chunk_size > self.arena_bytes {
            return Err(MemoryError::InvalidConfig(format!(
                "span_chunk_size {} exceeds arena_bytes {}",
                self.span_chunk_size, self.arena_bytes
            )));
        }
        Ok(())
    }

    /// Creates an arena of `arena_bytes`.
    #[must_use]
    pub const fn build_arena(&self) -> Arena {
        Arena::new(self.arena_bytes)
    }
}
