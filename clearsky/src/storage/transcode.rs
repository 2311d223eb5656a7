//! Transcoders stream a finished local raster into an object writer.

use std::path::Path;

use futures::FutureExt;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{ObjectWriter, StorageError};
use crate::raster::planar::format::{self, BlockOrder};
use crate::source::BoxFuture;

/// Bytes handed to the object writer per call.
pub const TRANSCODE_CHUNK_SIZE: usize = 1024 * 1024;

/// Converts a local raster into its stored form.
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Stream `input` into `output`, returning the bytes written.
    ///
    /// Does not commit; the caller decides based on the result.
    fn transcode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a mut dyn ObjectWriter,
    ) -> BoxFuture<'a, Result<u64, StorageError>>;
}

/// Copies the file unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Transcoder for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn transcode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a mut dyn ObjectWriter,
    ) -> BoxFuture<'a, Result<u64, StorageError>> {
        async move {
            let mut file = tokio::fs::File::open(input).await?;
            let mut buf = vec![0u8; TRANSCODE_CHUNK_SIZE];
            let mut total = 0u64;
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                output.write(&buf[..n]).await?;
                total += n as u64;
            }
            Ok(total)
        }
        .boxed()
    }
}

/// Rewrites planar containers for partial-range access.
///
/// The header and block index stay at the front and the overview blocks
/// move ahead of full resolution, smallest level first, so a client can
/// fetch a preview with one short range request.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloudOptimizer;

impl Transcoder for CloudOptimizer {
    fn name(&self) -> &str {
        "cloud-optimizer"
    }

    fn transcode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a mut dyn ObjectWriter,
    ) -> BoxFuture<'a, Result<u64, StorageError>> {
        async move {
            let bytes = tokio::fs::read(input).await?;
            let id = input.display().to_string();
            let optimized = tokio::task::spawn_blocking(move || {
                format::relayout(&id, &bytes, BlockOrder::OverviewsFirst)
            })
            .await
            .map_err(|e| StorageError::Backend(format!("transcode task failed: {}", e)))?
            .map_err(StorageError::from)?;

            for chunk in optimized.chunks(TRANSCODE_CHUNK_SIZE) {
                output.write(chunk).await?;
            }
            debug!(input = %input.display(), bytes = optimized.len(), "Transcoded raster");
            Ok(optimized.len() as u64)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoTransform;
    use crate::raster::planar::encode_container;
    use crate::raster::{CreateOptions, PixelBuffer, RasterStructure, Resampling, SampleType};
    use crate::storage::{MemoryObjectStore, ObjectLocation, ObjectStore};

    #[tokio::test]
    async fn test_passthrough_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bin");
        let data: Vec<u8> = (0..=255).cycle().take(TRANSCODE_CHUNK_SIZE + 17).collect();
        std::fs::write(&path, &data).unwrap();

        let store = MemoryObjectStore::new();
        let loc = ObjectLocation::parse("gs://b/out.bin").unwrap();
        let mut writer = store.create(&loc).await.unwrap();
        let n = Passthrough.transcode(&path, writer.as_mut()).await.unwrap();
        writer.commit().await.unwrap();

        assert_eq!(n as usize, data.len());
        assert_eq!(&store.get(&loc).await.unwrap()[..], &data[..]);
    }

    #[tokio::test]
    async fn test_optimizer_puts_overviews_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.csky");
        let options =
            CreateOptions::tiled(RasterStructure::new(16, 16, 3, SampleType::U8)).with_block_size(4);
        let bytes = encode_container(
            &options,
            GeoTransform::identity(),
            "EPSG:3857",
            &PixelBuffer::U8((0..16 * 16 * 3).map(|v| (v % 250) as u8 + 1).collect()),
            Some(Resampling::Average),
        )
        .unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let store = MemoryObjectStore::new();
        let loc = ObjectLocation::parse("gs://b/tile.csky").unwrap();
        let mut writer = store.create(&loc).await.unwrap();
        CloudOptimizer.transcode(&path, writer.as_mut()).await.unwrap();
        writer.commit().await.unwrap();

        let stored = store.get(&loc).await.unwrap();
        let header = format::read_header("stored", &stored).unwrap();
        let smallest = header.levels.last().unwrap().blocks[0].offset;
        let full = header.levels[0].blocks[0].offset;
        assert!(smallest < full);
    }

    #[tokio::test]
    async fn test_optimizer_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-raster");
        std::fs::write(&path, b"GIF89a...").unwrap();

        let store = MemoryObjectStore::new();
        let loc = ObjectLocation::parse("gs://b/x").unwrap();
        let mut writer = store.create(&loc).await.unwrap();
        let err = CloudOptimizer
            .transcode(&path, writer.as_mut())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Transcode(_)));
    }
}
