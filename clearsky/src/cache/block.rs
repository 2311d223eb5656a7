//! Fixed-size block cache backed by moka.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use moka::future::Cache;
use moka::policy::EvictionPolicy;

use crate::source::{RangeSource, SourceError};

/// Default block size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default number of resident blocks (≈64 MiB with the default block size).
pub const DEFAULT_BLOCK_CAPACITY: u64 = 1000;

/// Cache key: one block of one source object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    source: Arc<str>,
    index: u64,
}

impl BlockKey {
    pub fn new(source: &str, index: u64) -> Self {
        Self {
            source: Arc::from(source),
            index,
        }
    }

    /// Identifier of the source object.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Block index within the object.
    pub fn index(&self) -> u64 {
        self.index
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Block lookups served from memory.
    pub hits: u64,
    /// Block lookups that went to the source.
    pub misses: u64,
    /// Bytes read from sources on misses.
    pub bytes_fetched: u64,
    /// Blocks currently resident.
    pub resident_blocks: u64,
    /// Maximum resident blocks.
    pub capacity: u64,
}

impl CacheStats {
    /// Fraction of lookups served from memory (0.0 when idle).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} misses ({:.0}% hit rate), {} bytes fetched, {}/{} blocks resident",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.bytes_fetched,
            self.resident_blocks,
            self.capacity
        )
    }
}

/// Bounded LRU cache of fixed-size byte ranges of remote objects.
///
/// Safe to share between tasks (`Arc<BlockCache>`); moka handles concurrent
/// reads and insertions without blocking the runtime.
pub struct BlockCache {
    cache: Cache<BlockKey, Bytes>,
    block_size: usize,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    bytes_fetched: AtomicU64,
}

impl BlockCache {
    /// Create a cache of `capacity` blocks of `block_size` bytes.
    ///
    /// A zero block size is bumped to one byte.
    pub fn new(block_size: usize, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            cache,
            block_size: block_size.max(1),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bytes_fetched: AtomicU64::new(0),
        }
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Maximum number of resident blocks.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Read `len` bytes at `offset` from `source`, through the cache.
    ///
    /// The result is shorter than `len` only when the range crosses the end
    /// of the object.
    pub async fn read(
        &self,
        source: &dyn RangeSource,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, SourceError> {
        if len == 0 {
            return Ok(Bytes::new());
        }

        let bs = self.block_size as u64;
        let end = crate::source::range_end(source.id(), offset, len)?;
        let first = offset / bs;
        let last = (end - 1) / bs;

        if first == last {
            let block = self.block(source, first).await?;
            let start = (offset - first * bs) as usize;
            if start > block.len() {
                return Err(SourceError::OutOfRange {
                    id: source.id().to_string(),
                    offset,
                    len,
                    size: first * bs + block.len() as u64,
                });
            }
            let stop = (start + len).min(block.len());
            return Ok(block.slice(start..stop));
        }

        let mut out = BytesMut::with_capacity(len);
        for index in first..=last {
            let block = self.block(source, index).await?;
            let block_start = index * bs;
            let from = offset.saturating_sub(block_start) as usize;
            let to = ((end - block_start) as usize).min(block.len());
            if from > block.len() {
                break;
            }
            out.extend_from_slice(&block[from..to]);
            if block.len() < self.block_size {
                // short block: end of object
                break;
            }
        }
        Ok(out.freeze())
    }

    /// Fetch one block, from memory if resident.
    pub async fn block(&self, source: &dyn RangeSource, index: u64) -> Result<Bytes, SourceError> {
        let key = BlockKey::new(source.id(), index);
        if let Some(block) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let offset = index * self.block_size as u64;
        let block_size = self.block_size;
        self.cache
            .try_get_with(key, async move {
                let data = source.read_range(offset, block_size).await?;
                self.bytes_fetched
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok::<_, SourceError>(data)
            })
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(SourceError::Shared))
    }

    /// True if the block is resident.
    pub fn contains(&self, source: &str, index: u64) -> bool {
        self.cache.contains_key(&BlockKey::new(source, index))
    }

    /// Apply pending evictions so counts reflect the capacity bound.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            resident_blocks: self.cache.entry_count(),
            capacity: self.capacity,
        }
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CAPACITY)
    }
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("block_size", &self.block_size)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
