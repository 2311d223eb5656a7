//! Range source decorator that reads through a [`BlockCache`].

use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::OnceCell;

use super::BlockCache;
use crate::source::{BoxFuture, RangeSource, SourceError};

/// Wraps a source so every read goes through the shared block cache.
///
/// The object size is resolved once per wrapper.
pub struct CachedSource {
    inner: Arc<dyn RangeSource>,
    cache: Arc<BlockCache>,
    size: OnceCell<u64>,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn RangeSource>, cache: Arc<BlockCache>) -> Self {
        Self {
            inner,
            cache,
            size: OnceCell::new(),
        }
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }
}

impl RangeSource for CachedSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn size(&self) -> BoxFuture<'_, Result<u64, SourceError>> {
        async move {
            self.size
                .get_or_try_init(|| self.inner.size())
                .await
                .copied()
        }
        .boxed()
    }

    fn read_range(&self, offset: u64, len: usize) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        async move { self.cache.read(self.inner.as_ref(), offset, len).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRangeSource;

    #[tokio::test]
    async fn test_reads_through_cache() {
        let cache = Arc::new(BlockCache::new(8, 16));
        let inner: Arc<dyn RangeSource> =
            Arc::new(MemoryRangeSource::new("scene", (0u8..64).collect::<Vec<_>>()));
        let source = CachedSource::new(inner, Arc::clone(&cache));

        assert_eq!(source.id(), "scene");
        assert_eq!(source.size().await.unwrap(), 64);
        assert_eq!(&source.read_range(6, 4).await.unwrap()[..], &[6, 7, 8, 9]);
        assert!(cache.contains("scene", 0));
        assert!(cache.contains("scene", 1));
    }

    #[tokio::test]
    async fn test_wrappers_share_blocks() {
        let cache = Arc::new(BlockCache::new(8, 16));
        let inner: Arc<dyn RangeSource> =
            Arc::new(MemoryRangeSource::new("scene", vec![1u8; 32]));

        let first = CachedSource::new(Arc::clone(&inner), Arc::clone(&cache));
        let second = CachedSource::new(inner, Arc::clone(&cache));
        first.read_range(0, 8).await.unwrap();
        second.read_range(0, 8).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }
}
