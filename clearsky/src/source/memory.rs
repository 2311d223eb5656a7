//! In-memory range source.

use bytes::Bytes;
use futures::FutureExt;

use super::{BoxFuture, RangeSource, SourceError};

/// A source backed by a byte buffer.
#[derive(Debug, Clone)]
pub struct MemoryRangeSource {
    id: String,
    data: Bytes,
}

impl MemoryRangeSource {
    /// Wrap `data` under identifier `id`.
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    pub(crate) fn slice(
        id: &str,
        data: &Bytes,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, SourceError> {
        let size = data.len() as u64;
        if offset > size {
            return Err(SourceError::OutOfRange {
                id: id.to_string(),
                offset,
                len,
                size,
            });
        }
        let start = offset as usize;
        let end = start.saturating_add(len).min(data.len());
        Ok(data.slice(start..end))
    }
}

impl RangeSource for MemoryRangeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> BoxFuture<'_, Result<u64, SourceError>> {
        let size = self.data.len() as u64;
        async move { Ok(size) }.boxed()
    }

    fn read_range(&self, offset: u64, len: usize) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        let result = Self::slice(&self.id, &self.data, offset, len);
        async move { result }.boxed()
    }
}
