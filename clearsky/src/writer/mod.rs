//! Raster writer.
//!
//! Materializes a composite as a georeferenced, internally tiled raster:
//!
//! 1. create an output the size of the tile window with the sources' band
//!    count and sample type
//! 2. shift the reference transform to the window origin and copy the
//!    projection verbatim
//! 3. write the planar pixels, build an averaged overview pyramid, close

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::fetch::FetchedSource;
use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::raster::{
    Compression, CreateOptions, PixelBuffer, RasterDriver, RasterError, RasterStructure,
    Resampling, DEFAULT_OUTPUT_BLOCK_SIZE,
};

/// Errors raised while writing an output raster.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write an empty window")]
    EmptyWindow,

    #[error("composite holds {actual} samples, window needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Georeferencing shared by every tile of an area of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Georeference {
    /// Transform of the full area (pixel 0,0 at the area origin).
    pub transform: GeoTransform,
    pub projection: String,
}

impl Georeference {
    pub fn new(transform: GeoTransform, projection: impl Into<String>) -> Self {
        Self {
            transform,
            projection: projection.into(),
        }
    }

    /// Georeferencing of the first (authoritative) source.
    pub fn from_source(source: &FetchedSource) -> Self {
        Self::new(source.geo_transform, source.projection.clone())
    }
}

/// Writes composites through a [`RasterDriver`].
pub struct RasterWriter {
    driver: Arc<dyn RasterDriver>,
    block_size: u32,
    compression: Compression,
    resampling: Resampling,
}

impl RasterWriter {
    pub fn new(driver: Arc<dyn RasterDriver>) -> Self {
        Self {
            driver,
            block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
            compression: Compression::default(),
            resampling: Resampling::Average,
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Write `pixels` covering `window` to `path`.
    ///
    /// Blocking; run on a blocking thread from async code.
    pub fn write(
        &self,
        path: &Path,
        window: &Window,
        georeference: &Georeference,
        bands: usize,
        pixels: &PixelBuffer,
    ) -> Result<(), WriteError> {
        if window.is_empty() {
            return Err(WriteError::EmptyWindow);
        }
        let expected = window.pixel_count() * bands;
        if pixels.len() != expected {
            return Err(WriteError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let structure =
            RasterStructure::new(window.width(), window.height(), bands, pixels.sample_type());
        let options = CreateOptions::tiled(structure)
            .with_block_size(self.block_size)
            .with_compression(self.compression);

        let mut sink = self.driver.create(path, &options)?;
        sink.set_geo_transform(georeference.transform.for_window(window));
        sink.set_projection(&georeference.projection);
        sink.write(pixels)?;
        sink.build_overviews(self.resampling)?;
        sink.close()?;

        debug!(
            path = %path.display(),
            tile = %window,
            driver = self.driver.name(),
            "Wrote composite raster"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::memory::MemoryDriver;
    use crate::raster::planar::{PlanarDataset, PlanarDriver};
    use crate::raster::{Dataset, SampleType};
    use crate::source::FileRangeSource;

    fn georef() -> Georeference {
        Georeference::new(
            GeoTransform::north_up(300_000.0, 5_000_040.0, 10.0, -10.0),
            "PROJCS[\"WGS 84 / UTM zone 33N\"]",
        )
    }

    #[test]
    fn test_transform_shifted_to_window_origin() {
        let driver = MemoryDriver::new();
        let writer = RasterWriter::new(Arc::new(driver.clone())).with_block_size(4);
        let window = Window::new(512, 1024, 8, 8);
        writer
            .write(
                Path::new("tile512-1024.tif"),
                &window,
                &georef(),
                3,
                &PixelBuffer::U8(vec![7; 8 * 8 * 3]),
            )
            .unwrap();

        let out = driver.get(Path::new("tile512-1024.tif")).unwrap();
        assert_eq!(out.geo_transform.origin_x(), 300_000.0 + 512.0 * 10.0);
        assert_eq!(out.geo_transform.origin_y(), 5_000_040.0 - 1024.0 * 10.0);
        assert_eq!(out.geo_transform.pixel_width(), 10.0);
        assert_eq!(out.projection, georef().projection);
        assert_eq!(out.options.structure, RasterStructure::new(8, 8, 3, SampleType::U8));
        assert_eq!(out.overviews.len(), 1);
    }

    #[test]
    fn test_size_mismatch() {
        let writer = RasterWriter::new(Arc::new(MemoryDriver::new()));
        let err = writer
            .write(
                Path::new("x"),
                &Window::new(0, 0, 4, 4),
                &georef(),
                3,
                &PixelBuffer::U8(vec![0; 10]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::SizeMismatch {
                expected: 48,
                actual: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_planar_output_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.csky");
        let pixels: Vec<u16> = (0..6 * 5 * 3).map(|v| v * 97).collect();
        let window = Window::new(6, 0, 6, 5);
        RasterWriter::new(Arc::new(PlanarDriver::new()))
            .with_block_size(4)
            .write(&path, &window, &georef(), 3, &PixelBuffer::U16(pixels.clone()))
            .unwrap();

        let ds = PlanarDataset::open(Arc::new(FileRangeSource::new(&path)))
            .await
            .unwrap();
        let read = ds.read_window(&Window::new(0, 0, 6, 5)).await.unwrap();
        assert_eq!(read, PixelBuffer::U16(pixels));
        assert_eq!(ds.geo_transform().origin_x(), 300_060.0);
        assert!(ds.level_count() > 1);
    }
}
