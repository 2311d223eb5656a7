//! In-memory raster driver.
//!
//! [`MemoryOpener`] serves registered datasets by identifier and
//! [`MemoryDriver`] keeps closed outputs so they can be inspected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;

use super::{
    extract_window, overview, CreateOptions, Dataset, DatasetOpener, PixelBuffer, RasterDriver,
    RasterError, RasterSink, RasterStructure, Resampling,
};
use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::source::BoxFuture;

/// A fully resident raster.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDataset {
    id: String,
    structure: RasterStructure,
    geo_transform: GeoTransform,
    projection: String,
    data: PixelBuffer,
}

impl MemoryDataset {
    /// Build a dataset from planar data.
    pub fn new(
        id: impl Into<String>,
        width: u32,
        height: u32,
        bands: usize,
        data: PixelBuffer,
    ) -> Result<Self, RasterError> {
        let structure = RasterStructure::new(width, height, bands, data.sample_type());
        data.check(structure.sample_type, structure.sample_count())?;
        Ok(Self {
            id: id.into(),
            structure,
            geo_transform: GeoTransform::identity(),
            projection: String::new(),
            data,
        })
    }

    pub fn with_geo_transform(mut self, transform: GeoTransform) -> Self {
        self.geo_transform = transform;
        self
    }

    pub fn with_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = projection.into();
        self
    }

    pub fn data(&self) -> &PixelBuffer {
        &self.data
    }

    fn window(&self, window: &Window) -> Result<PixelBuffer, RasterError> {
        let s = self.structure;
        if !window.fits_within(s.width, s.height) {
            return Err(RasterError::WindowOutOfBounds {
                window: *window,
                width: s.width,
                height: s.height,
            });
        }
        Ok(match &self.data {
            PixelBuffer::U8(v) => {
                PixelBuffer::U8(extract_window(v, s.width, s.height, s.bands, window))
            }
            PixelBuffer::U16(v) => {
                PixelBuffer::U16(extract_window(v, s.width, s.height, s.bands, window))
            }
        })
    }
}

impl Dataset for MemoryDataset {
    fn id(&self) -> &str {
        &self.id
    }

    fn structure(&self) -> RasterStructure {
        self.structure
    }

    fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    fn projection(&self) -> &str {
        &self.projection
    }

    fn read_window<'a>(
        &'a self,
        window: &'a Window,
    ) -> BoxFuture<'a, Result<PixelBuffer, RasterError>> {
        async move { self.window(window) }.boxed()
    }
}

/// Opens registered in-memory datasets.
#[derive(Default)]
pub struct MemoryOpener {
    datasets: RwLock<HashMap<String, Arc<MemoryDataset>>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under its own identifier.
    pub fn insert(&self, dataset: MemoryDataset) {
        self.datasets
            .write()
            .insert(dataset.id.clone(), Arc::new(dataset));
    }
}

struct SharedDataset(Arc<MemoryDataset>);

impl Dataset for SharedDataset {
    fn id(&self) -> &str {
        self.0.id()
    }

    fn structure(&self) -> RasterStructure {
        self.0.structure()
    }

    fn geo_transform(&self) -> GeoTransform {
        self.0.geo_transform()
    }

    fn projection(&self) -> &str {
        self.0.projection()
    }

    fn read_window<'a>(
        &'a self,
        window: &'a Window,
    ) -> BoxFuture<'a, Result<PixelBuffer, RasterError>> {
        self.0.read_window(window)
    }
}

impl DatasetOpener for MemoryOpener {
    fn open<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Box<dyn Dataset>, RasterError>> {
        async move {
            let dataset = self
                .datasets
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| RasterError::NotFound(id.to_string()))?;
            Ok(Box::new(SharedDataset(dataset)) as Box<dyn Dataset>)
        }
        .boxed()
    }
}

/// A raster written through [`MemoryDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    pub options: CreateOptions,
    pub geo_transform: GeoTransform,
    pub projection: String,
    pub data: Option<PixelBuffer>,
    pub overviews: Vec<overview::OverviewLevel>,
}

/// Output driver that keeps closed rasters in memory, keyed by path.
#[derive(Default, Clone)]
pub struct MemoryDriver {
    closed: Arc<RwLock<HashMap<PathBuf, MemoryRaster>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raster closed at `path`, if any.
    pub fn get(&self, path: &Path) -> Option<MemoryRaster> {
        self.closed.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.closed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RasterDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(
        &self,
        path: &Path,
        options: &CreateOptions,
    ) -> Result<Box<dyn RasterSink>, RasterError> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            raster: MemoryRaster {
                options: *options,
                geo_transform: GeoTransform::identity(),
                projection: String::new(),
                data: None,
                overviews: Vec::new(),
            },
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MemorySink {
    path: PathBuf,
    raster: MemoryRaster,
    closed: Arc<RwLock<HashMap<PathBuf, MemoryRaster>>>,
}

impl RasterSink for MemorySink {
    fn set_geo_transform(&mut self, transform: GeoTransform) {
        self.raster.geo_transform = transform;
    }

    fn set_projection(&mut self, projection: &str) {
        self.raster.projection = projection.to_string();
    }

    fn write(&mut self, buffer: &PixelBuffer) -> Result<(), RasterError> {
        let s = self.raster.options.structure;
        buffer.check(s.sample_type, s.sample_count())?;
        self.raster.data = Some(buffer.clone());
        Ok(())
    }

    fn build_overviews(&mut self, resampling: Resampling) -> Result<(), RasterError> {
        let data = self
            .raster
            .data
            .as_ref()
            .ok_or_else(|| RasterError::InvalidState("overviews requested before write".into()))?;
        let s = self.raster.options.structure;
        self.raster.overviews = overview::build(
            data,
            s.width,
            s.height,
            s.bands,
            self.raster.options.block_size,
            resampling,
        );
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), RasterError> {
        let this = *self;
        this.closed.write().insert(this.path, this.raster);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleType;

    fn dataset() -> MemoryDataset {
        // 4x2, 2 bands
        let data: Vec<u8> = (0..16).collect();
        MemoryDataset::new("scene", 4, 2, 2, data.into()).unwrap()
    }

    #[tokio::test]
    async fn test_read_window() {
        let ds = dataset();
        let buf = ds.read_window(&Window::new(2, 1, 2, 1)).await.unwrap();
        assert_eq!(buf, PixelBuffer::U8(vec![6, 7, 14, 15]));
    }

    #[tokio::test]
    async fn test_window_out_of_bounds() {
        let ds = dataset();
        let err = ds.read_window(&Window::new(3, 0, 2, 1)).await.unwrap_err();
        assert!(matches!(err, RasterError::WindowOutOfBounds { .. }));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = MemoryDataset::new("x", 4, 4, 3, vec![0u8; 10].into()).unwrap_err();
        assert!(matches!(err, RasterError::BufferSize { .. }));
    }

    #[tokio::test]
    async fn test_opener() {
        let opener = MemoryOpener::new();
        opener.insert(dataset().with_projection("EPSG:32633"));
        let ds = opener.open("scene").await.unwrap();
        assert_eq!(ds.projection(), "EPSG:32633");
        assert_eq!(ds.structure().bands, 2);
        assert!(matches!(
            opener.open("missing").await,
            Err(RasterError::NotFound(_))
        ));
    }

    #[test]
    fn test_driver_keeps_closed_rasters() {
        let driver = MemoryDriver::new();
        let structure = RasterStructure::new(4, 4, 1, SampleType::U8);
        let options = CreateOptions::tiled(structure).with_block_size(2);
        let mut sink = driver.create(Path::new("/tmp/out"), &options).unwrap();
        sink.set_projection("EPSG:4326");
        sink.write(&PixelBuffer::U8(vec![9; 16])).unwrap();
        sink.build_overviews(Resampling::Average).unwrap();
        assert!(driver.is_empty());
        sink.close().unwrap();

        let raster = driver.get(Path::new("/tmp/out")).unwrap();
        assert_eq!(raster.projection, "EPSG:4326");
        assert_eq!(raster.overviews.len(), 1);
    }

    #[test]
    fn test_overviews_before_write_rejected() {
        let driver = MemoryDriver::new();
        let options = CreateOptions::tiled(RasterStructure::new(2, 2, 1, SampleType::U8));
        let mut sink = driver.create(Path::new("o"), &options).unwrap();
        assert!(matches!(
            sink.build_overviews(Resampling::Average),
            Err(RasterError::InvalidState(_))
        ));
    }
}
