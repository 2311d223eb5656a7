//! Raster dataset contracts and drivers.
//!
//! The compositing pipeline only needs a small contract from the raster
//! I/O layer:
//!
//! - **Input**: open a dataset by identifier, report its structure, affine
//!   transform and projection, and read a pixel window in planar layout.
//!   Dropping the dataset closes it.
//! - **Output**: create a raster, set georeferencing, write planar pixels,
//!   request a reduced-resolution pyramid, and close (flush) it.
//!
//! # Planar layout
//!
//! All pixel buffers are band-sequential: every sample of band 1, then every
//! sample of band 2, and so on. Within a band samples are row-major.
//!
//! ```text
//! [ R R R R … | G G G G … | B B B B … ]
//!   ◄─ w*h ─►   ◄─ w*h ─►   ◄─ w*h ─►
//! ```
//!
//! # Drivers
//!
//! - [`planar`] - tiled, deflate-compressed container read through byte
//!   ranges (and therefore through the block cache)
//! - [`memory`] - in-memory datasets and sinks for tests and staging

mod buffer;
pub mod memory;
pub mod overview;
pub mod planar;
mod sample;

pub use buffer::PixelBuffer;
pub use sample::{Sample, SampleType};

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::source::{BoxFuture, SourceError};

/// Errors raised by raster drivers.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Reading the underlying bytes failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset does not exist.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// The bytes are not a raster this driver understands.
    #[error("invalid raster {id}: {reason}")]
    InvalidFormat { id: String, reason: String },

    /// Header metadata could not be encoded or decoded.
    #[error("raster metadata error: {0}")]
    Metadata(#[from] bincode::Error),

    /// The requested window is not inside the raster.
    #[error("window {window} out of bounds for {width}x{height} raster")]
    WindowOutOfBounds {
        window: Window,
        width: u32,
        height: u32,
    },

    /// A buffer does not have the expected number of samples.
    #[error("buffer holds {actual} samples, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// A buffer has a different sample type than the raster.
    #[error("sample type mismatch: expected {expected}, got {actual}")]
    SampleTypeMismatch {
        expected: SampleType,
        actual: SampleType,
    },

    /// The sink was used in the wrong order (e.g. overviews before data).
    #[error("invalid raster operation: {0}")]
    InvalidState(String),
}

/// Size, band count and sample type of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterStructure {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub sample_type: SampleType,
}

impl RasterStructure {
    pub fn new(width: u32, height: u32, bands: usize, sample_type: SampleType) -> Self {
        Self {
            width,
            height,
            bands,
            sample_type,
        }
    }

    /// Samples in one band.
    pub fn band_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Samples across all bands.
    pub fn sample_count(&self) -> usize {
        self.band_len() * self.bands
    }
}

impl fmt::Display for RasterStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} band(s) {}",
            self.width, self.height, self.bands, self.sample_type
        )
    }
}

/// An open source dataset.
///
/// Dropping the dataset releases its handle.
pub trait Dataset: Send + Sync {
    /// Identifier the dataset was opened with.
    fn id(&self) -> &str;

    /// Pixel extent, band count and sample type.
    fn structure(&self) -> RasterStructure;

    /// Pixel-to-projected affine transform.
    fn geo_transform(&self) -> GeoTransform;

    /// Projection definition (WKT or authority code), copied verbatim.
    fn projection(&self) -> &str;

    /// Read `window` across all bands in planar layout.
    fn read_window<'a>(
        &'a self,
        window: &'a Window,
    ) -> BoxFuture<'a, Result<PixelBuffer, RasterError>>;
}

/// Opens datasets by identifier.
pub trait DatasetOpener: Send + Sync {
    /// Open the dataset named `id`.
    fn open<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Box<dyn Dataset>, RasterError>>;
}

/// Resampling used when building reduced-resolution levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    /// Mean of the contributing pixels.
    #[default]
    Average,
    /// Top-left contributing pixel.
    Nearest,
}

/// Lossless block compression for output rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    /// Deflate at the given level (0-9).
    Deflate { level: u32 },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Deflate { level: 6 }
    }
}

/// Default internal block (tile) size for outputs.
pub const DEFAULT_OUTPUT_BLOCK_SIZE: u32 = 256;

/// Creation options for an output raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    pub structure: RasterStructure,
    /// Internal tile size in pixels.
    pub block_size: u32,
    pub compression: Compression,
}

impl CreateOptions {
    /// Tiled, deflate-compressed output of the given structure.
    pub fn tiled(structure: RasterStructure) -> Self {
        Self {
            structure,
            block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
            compression: Compression::default(),
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
}

/// An output raster being written.
///
/// Sinks are synchronous; callers run them on a blocking thread.
pub trait RasterSink: Send {
    fn set_geo_transform(&mut self, transform: GeoTransform);

    fn set_projection(&mut self, projection: &str);

    /// Write the full raster in planar layout.
    fn write(&mut self, buffer: &PixelBuffer) -> Result<(), RasterError>;

    /// Build the reduced-resolution pyramid from the written data.
    fn build_overviews(&mut self, resampling: Resampling) -> Result<(), RasterError>;

    /// Flush everything and release the sink.
    fn close(self: Box<Self>) -> Result<(), RasterError>;
}

/// Creates output rasters.
pub trait RasterDriver: Send + Sync {
    /// Short driver name for logs.
    fn name(&self) -> &str;

    /// Create a raster at `path`.
    fn create(
        &self,
        path: &Path,
        options: &CreateOptions,
    ) -> Result<Box<dyn RasterSink>, RasterError>;
}

/// Copy `window` out of a full planar raster.
pub(crate) fn extract_window<T: Sample>(
    data: &[T],
    width: u32,
    height: u32,
    bands: usize,
    window: &Window,
) -> Vec<T> {
    let band_len = width as usize * height as usize;
    let ww = window.width() as usize;
    let mut out = Vec::with_capacity(window.pixel_count() * bands);
    for band in 0..bands {
        let base = band * band_len;
        for row in window.y()..window.bottom() {
            let start = base + row as usize * width as usize + window.x() as usize;
            out.extend_from_slice(&data[start..start + ww]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_window_is_planar() {
        // 3x2 raster, 2 bands
        let data: Vec<u8> = vec![
            1, 2, 3, //
            4, 5, 6, //
            11, 12, 13, //
            14, 15, 16,
        ];
        let out = extract_window(&data, 3, 2, 2, &Window::new(1, 0, 2, 2));
        assert_eq!(out, vec![2, 3, 5, 6, 12, 13, 15, 16]);
    }

    #[test]
    fn test_structure_counts() {
        let s = RasterStructure::new(4, 3, 3, SampleType::U8);
        assert_eq!(s.band_len(), 12);
        assert_eq!(s.sample_count(), 36);
        assert_eq!(s.to_string(), "4x3 3 band(s) u8");
    }

    #[test]
    fn test_default_create_options_are_lossless_tiled() {
        let opts = CreateOptions::tiled(RasterStructure::new(512, 512, 3, SampleType::U8));
        assert_eq!(opts.block_size, 256);
        assert!(matches!(opts.compression, Compression::Deflate { .. }));
    }
}
