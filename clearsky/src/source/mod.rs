//! Byte-range access to source objects.
//!
//! Raster sources live in object storage and are read with byte-range
//! requests. The [`RangeSource`] trait abstracts over where the bytes come
//! from so that the block cache and raster drivers can be tested without a
//! network:
//!
//! - [`HttpRangeSource`] - HTTP `Range` requests via `reqwest`
//! - [`FileRangeSource`] - local files
//! - [`MemoryRangeSource`] - in-memory buffers (tests, staging)
//!
//! A [`SourceResolver`] maps dataset identifiers to sources.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so sources can be shared as
//! `Arc<dyn RangeSource>` across fetch tasks.

mod file;
mod http;
mod memory;
mod resolver;

pub use file::FileRangeSource;
pub use http::HttpRangeSource;
pub use memory::MemoryRangeSource;
pub use resolver::{DefaultResolver, MemoryResolver, SourceResolver};

pub use futures::future::BoxFuture;

use bytes::Bytes;
use thiserror::Error;

/// Errors raised while reading source bytes.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The object does not exist.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The server answered with an unexpected status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request could not be sent or its body not read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object size could not be determined.
    #[error("unknown length for {0}")]
    UnknownLength(String),

    /// Identifier that no resolver understands.
    #[error("invalid source identifier: {0}")]
    InvalidIdentifier(String),

    /// A read was attempted past the end of the object.
    #[error("range {offset}+{len} is beyond the end of {id} ({size} bytes)")]
    OutOfRange {
        id: String,
        offset: u64,
        len: usize,
        size: u64,
    },

    /// Failure shared by every reader that was waiting on the same block.
    #[error(transparent)]
    Shared(std::sync::Arc<SourceError>),
}

/// Exclusive end of the range `offset..offset + len`.
///
/// A range that does not fit in the 64-bit address space is out of range
/// for every object.
pub(crate) fn range_end(id: &str, offset: u64, len: usize) -> Result<u64, SourceError> {
    offset
        .checked_add(len as u64)
        .ok_or_else(|| SourceError::OutOfRange {
            id: id.to_string(),
            offset,
            len,
            size: u64::MAX,
        })
}

/// Random access to the bytes of one remote object.
///
/// Implementations must be `Send + Sync`; a single source is read
/// concurrently by the block cache.
pub trait RangeSource: Send + Sync {
    /// Identifier used in cache keys and logs.
    fn id(&self) -> &str;

    /// Total size of the object in bytes.
    fn size(&self) -> BoxFuture<'_, Result<u64, SourceError>>;

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns fewer than `len` bytes only when the range crosses the end of
    /// the object.
    fn read_range(&self, offset: u64, len: usize) -> BoxFuture<'_, Result<Bytes, SourceError>>;
}
