//! Filesystem-backed object store.
//!
//! Objects live at `root/bucket/key`. Plain path locations are taken
//! relative to `root` unless absolute. A write goes to a hidden partial file
//! next to the destination and is renamed into place on commit, so readers
//! see either the previous object or the complete new one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{hex_digest, ObjectInfo, ObjectLocation, ObjectStore, ObjectWriter, StorageError};
use crate::source::BoxFuture;

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores objects under a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `location`.
    pub fn path_for(&self, location: &ObjectLocation) -> PathBuf {
        if location.is_file() {
            let key = Path::new(location.key());
            if key.is_absolute() {
                key.to_path_buf()
            } else {
                self.root.join(key)
            }
        } else {
            self.root.join(location.bucket()).join(location.key())
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    fn create<'a>(
        &'a self,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<Box<dyn ObjectWriter>, StorageError>> {
        async move {
            let target = self.path_for(location);
            let dir = target
                .parent()
                .ok_or_else(|| StorageError::InvalidLocation(location.to_string()))?;
            tokio::fs::create_dir_all(dir).await?;

            let partial = dir.join(format!(
                ".{}.{}.{}.partial",
                location.file_name(),
                std::process::id(),
                PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            let file = tokio::fs::File::create(&partial).await?;
            debug!(partial = %partial.display(), "Opened partial object");

            Ok(Box::new(LocalObjectWriter {
                location: location.clone(),
                target,
                partial,
                file: Some(file),
                hasher: Sha256::new(),
                size: 0,
                settled: false,
            }) as Box<dyn ObjectWriter>)
        }
        .boxed()
    }

    fn get<'a>(&'a self, location: &'a ObjectLocation) -> BoxFuture<'a, Result<Bytes, StorageError>> {
        async move {
            match tokio::fs::read(self.path_for(location)).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(location.clone()))
                }
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }
}

struct LocalObjectWriter {
    location: ObjectLocation,
    target: PathBuf,
    partial: PathBuf,
    /// `None` once a commit or abort has started.
    file: Option<tokio::fs::File>,
    hasher: Sha256,
    size: u64,
    /// Set once the partial file has been renamed into place or removed.
    settled: bool,
}

impl ObjectWriter for LocalObjectWriter {
    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let file = self.file.as_mut().ok_or(StorageError::Finished)?;
            file.write_all(chunk).await?;
            self.hasher.update(chunk);
            self.size += chunk.len() as u64;
            Ok(())
        }
        .boxed()
    }

    fn commit(mut self: Box<Self>) -> BoxFuture<'static, Result<ObjectInfo, StorageError>> {
        async move {
            let mut file = self.file.take().ok_or(StorageError::Finished)?;
            let result = async {
                file.flush().await?;
                file.sync_all().await?;
                drop(file);
                tokio::fs::rename(&self.partial, &self.target).await
            }
            .await;
            if let Err(e) = result {
                remove_partial(&self.partial).await;
                self.settled = true;
                return Err(e.into());
            }
            self.settled = true;

            let sha256 = hex_digest(&std::mem::take(&mut self.hasher).finalize());
            Ok(ObjectInfo {
                location: self.location.clone(),
                size: self.size,
                sha256,
            })
        }
        .boxed()
    }

    fn abort(mut self: Box<Self>) -> BoxFuture<'static, Result<(), StorageError>> {
        async move {
            if let Some(file) = self.file.take() {
                drop(file);
                remove_partial(&self.partial).await;
                self.settled = true;
                debug!(location = %self.location, "Aborted object write");
            }
            Ok(())
        }
        .boxed()
    }
}

impl Drop for LocalObjectWriter {
    fn drop(&mut self) {
        // Dropped mid-write or mid-commit (a cancelled job): discard the partial.
        if !self.settled {
            drop(self.file.take());
            if let Err(e) = std::fs::remove_file(&self.partial) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(partial = %self.partial.display(), error = %e, "Failed to remove partial object");
                }
            }
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(partial = %path.display(), error = %e, "Failed to remove partial object");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_commit_makes_object_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::parse("gs://bucket/out/tile0-0.tif").unwrap();

        let mut writer = store.create(&loc).await.unwrap();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        assert!(matches!(store.get(&loc).await, Err(StorageError::NotFound(_))));

        let info = writer.commit().await.unwrap();
        assert_eq!(info.size, 11);
        assert_eq!(
            info.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(&store.get(&loc).await.unwrap()[..], b"hello world");
        assert_eq!(entries(&dir.path().join("bucket/out")), vec!["tile0-0.tif"]);
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::parse("gs://bucket/tile.tif").unwrap();

        let mut writer = store.create(&loc).await.unwrap();
        writer.write(b"partial").await.unwrap();
        writer.abort().await.unwrap();

        assert!(entries(&dir.path().join("bucket")).is_empty());
    }

    #[tokio::test]
    async fn test_drop_discards_partial() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::parse("gs://bucket/tile.tif").unwrap();
        {
            let mut writer = store.create(&loc).await.unwrap();
            writer.write(b"partial").await.unwrap();
        }
        assert!(entries(&dir.path().join("bucket")).is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_commit_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::parse("gs://bucket/tile.tif").unwrap();

        let mut writer = store.create(&loc).await.unwrap();
        writer.write(&vec![7u8; 4 * 1024 * 1024]).await.unwrap();

        // A zero timeout drops the commit at its first pending await.
        let outcome = tokio::time::timeout(std::time::Duration::ZERO, writer.commit()).await;

        let names = entries(&dir.path().join("bucket"));
        assert!(names.iter().all(|n| !n.ends_with(".partial")), "left behind: {:?}", names);
        match outcome {
            Ok(committed) => {
                committed.unwrap();
                assert_eq!(names, vec!["tile.tif"]);
            }
            Err(_) => assert!(names.is_empty() || names == vec!["tile.tif"]),
        }
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::parse("tiles/a.tif").unwrap();

        for body in [&b"first"[..], &b"second"[..]] {
            let mut writer = store.create(&loc).await.unwrap();
            writer.write(body).await.unwrap();
            writer.commit().await.unwrap();
        }
        assert_eq!(&store.get(&loc).await.unwrap()[..], b"second");
        assert_eq!(store.path_for(&loc), dir.path().join("tiles/a.tif"));
    }
}
