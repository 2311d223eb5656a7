//! Remote block cache.
//!
//! Overlapping tile windows read the same byte ranges of each source over
//! and over: headers, block indexes, blocks shared by neighbouring tiles.
//! [`BlockCache`] keeps fixed-size blocks of remote objects in memory so
//! that repeated reads are served without a network round-trip.
//!
//! # Design
//!
//! ```text
//!  read(source, offset, len)
//!        │
//!        ▼
//!  ┌───────────────┐  hit   ┌───────────────────────────────┐
//!  │ split into    │ ─────► │ moka::future::Cache           │
//!  │ block indexes │        │ key = (source id, block index) │
//!  └───────────────┘        │ LRU, bounded by block count   │
//!        │ miss             └───────────────────────────────┘
//!        ▼
//!  RangeSource::read_range(index * block_size, block_size)
//! ```
//!
//! The cache is read-only with respect to the sources and is shared by all
//! fetch tasks for the lifetime of a worker. Concurrent misses on the same
//! block are coalesced so the block is fetched once.

mod block;
mod cached_source;

pub use block::{BlockCache, BlockKey, CacheStats, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use cached_source::CachedSource;
