//! Uploader: transcode a local raster straight into object storage.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ObjectInfo, ObjectLocation, ObjectStore, StorageError, Transcoder};

/// Errors raised while uploading an output.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to open {location} for writing: {source}")]
    Open {
        location: ObjectLocation,
        #[source]
        source: StorageError,
    },

    #[error("transcode into {location} failed: {source}")]
    Transcode {
        location: ObjectLocation,
        #[source]
        source: StorageError,
    },

    #[error("commit of {location} failed: {source}")]
    Commit {
        location: ObjectLocation,
        #[source]
        source: StorageError,
    },

    #[error("upload of {0} cancelled")]
    Cancelled(ObjectLocation),
}

/// Streams local rasters into an [`ObjectStore`] through a [`Transcoder`].
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { store, transcoder }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `local` to `destination`.
    ///
    /// The object becomes visible only if every byte was transcoded and the
    /// commit succeeded. On failure or cancellation the pending write is
    /// aborted. `local` itself is left for the caller to remove.
    pub async fn upload(
        &self,
        local: &Path,
        destination: &ObjectLocation,
        cancel: &CancellationToken,
    ) -> Result<ObjectInfo, UploadError> {
        let mut writer = self
            .store
            .create(destination)
            .await
            .map_err(|source| UploadError::Open {
                location: destination.clone(),
                source,
            })?;

        let transcoded = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.transcoder.transcode(local, writer.as_mut()) => Some(result),
        };

        let failure = match transcoded {
            Some(Ok(bytes)) if !cancel.is_cancelled() => {
                debug!(
                    destination = %destination,
                    transcoder = self.transcoder.name(),
                    bytes,
                    "Transcoded output"
                );
                None
            }
            Some(Ok(_)) | None => Some(UploadError::Cancelled(destination.clone())),
            Some(Err(source)) => Some(UploadError::Transcode {
                location: destination.clone(),
                source,
            }),
        };

        if let Some(e) = failure {
            if let Err(abort_err) = writer.abort().await {
                warn!(destination = %destination, error = %abort_err, "Abort after failed upload also failed");
            }
            return Err(e);
        }

        writer.commit().await.map_err(|source| UploadError::Commit {
            location: destination.clone(),
            source,
        })
    }
}
