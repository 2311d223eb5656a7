//! Local file range source.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{BoxFuture, RangeSource, SourceError};

/// A source backed by a file on the local filesystem.
///
/// Each read opens the file, so no descriptor is held between reads.
#[derive(Debug, Clone)]
pub struct FileRangeSource {
    id: String,
    path: PathBuf,
}

impl FileRangeSource {
    /// Create a source for `path`; the identifier is the path itself.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            id: path.to_string_lossy().into_owned(),
            path,
        }
    }

    async fn open(&self) -> Result<tokio::fs::File, SourceError> {
        tokio::fs::File::open(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(self.id.clone())
            } else {
                SourceError::Io(e)
            }
        })
    }
}

impl RangeSource for FileRangeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> BoxFuture<'_, Result<u64, SourceError>> {
        async move {
            let file = self.open().await?;
            Ok(file.metadata().await?.len())
        }
        .boxed()
    }

    fn read_range(&self, offset: u64, len: usize) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        async move {
            let mut file = self.open().await?;
            let size = file.metadata().await?.len();
            if offset > size {
                return Err(SourceError::OutOfRange {
                    id: self.id.clone(),
                    offset,
                    len,
                    size,
                });
            }
            file.seek(SeekFrom::Start(offset)).await?;

            let want = (len as u64).min(size - offset) as usize;
            let mut buf = vec![0u8; want];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_range_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.bin");
        std::fs::write(&path, (0u8..100).collect::<Vec<_>>()).unwrap();

        let source = FileRangeSource::new(&path);
        assert_eq!(source.size().await.unwrap(), 100);
        assert_eq!(&source.read_range(10, 4).await.unwrap()[..], &[10, 11, 12, 13]);
        assert_eq!(source.read_range(98, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = FileRangeSource::new("/nonexistent/clearsky/scene.bin");
        assert!(matches!(
            source.read_range(0, 1).await,
            Err(SourceError::NotFound(_))
        ));
    }
}
