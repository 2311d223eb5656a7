//! Durable object storage and the upload path.
//!
//! ```text
//!  local raster ──► Transcoder ──► ObjectWriter ──commit──► visible object
//!                       │                │
//!                       └── any error ───┴──abort──► nothing visible
//! ```
//!
//! Object writers follow commit-on-close semantics: bytes written to a
//! writer are invisible until [`ObjectWriter::commit`] succeeds. Aborting,
//! or dropping the writer without committing, discards them.

mod local;
mod location;
mod memory;
mod transcode;
mod upload;

pub use local::LocalObjectStore;
pub use location::ObjectLocation;
pub use memory::MemoryObjectStore;
pub use transcode::{CloudOptimizer, Passthrough, Transcoder, TRANSCODE_CHUNK_SIZE};
pub use upload::{UploadError, Uploader};

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::raster::RasterError;
use crate::source::BoxFuture;

/// Errors raised by object stores and transcoders.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object location '{0}'")]
    InvalidLocation(String),

    #[error("object not found: {0}")]
    NotFound(ObjectLocation),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcode failed: {0}")]
    Transcode(#[from] RasterError),

    #[error("writer already finished")]
    Finished,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Metadata of a committed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub location: ObjectLocation,
    pub size: u64,
    /// Lowercase hex SHA-256 of the object bytes.
    pub sha256: String,
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes, sha256 {})", self.location, self.size, self.sha256)
    }
}

/// A pending object write.
pub trait ObjectWriter: Send {
    /// Append bytes.
    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Make the object visible, replacing any previous version.
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<ObjectInfo, StorageError>>;

    /// Discard everything written.
    fn abort(self: Box<Self>) -> BoxFuture<'static, Result<(), StorageError>>;
}

/// An object store.
pub trait ObjectStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start writing `location`.
    fn create<'a>(
        &'a self,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<Box<dyn ObjectWriter>, StorageError>>;

    /// Read a committed object.
    fn get<'a>(&'a self, location: &'a ObjectLocation) -> BoxFuture<'a, Result<Bytes, StorageError>>;
}

/// Hex SHA-256 digest.
pub(crate) fn hex_digest(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
