//! Output side of the planar container.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use super::format::{self, BlockOrder, EncodedLevel, Header};
use crate::geo::GeoTransform;
use crate::raster::overview::{self, OverviewLevel};
use crate::raster::{
    Compression, CreateOptions, PixelBuffer, RasterDriver, RasterError, RasterSink, Resampling,
    Sample,
};

/// Creates planar container files on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarDriver;

impl PlanarDriver {
    pub fn new() -> Self {
        Self
    }
}

impl RasterDriver for PlanarDriver {
    fn name(&self) -> &str {
        "planar"
    }

    fn create(
        &self,
        path: &Path,
        options: &CreateOptions,
    ) -> Result<Box<dyn RasterSink>, RasterError> {
        // Fail early on an unwritable location rather than at close.
        File::create(path)?;
        Ok(Box::new(PlanarSink {
            path: path.to_path_buf(),
            options: *options,
            geo_transform: GeoTransform::identity(),
            projection: String::new(),
            data: None,
            overviews: Vec::new(),
        }))
    }
}

/// Buffers a raster and writes the container on close.
pub struct PlanarSink {
    path: PathBuf,
    options: CreateOptions,
    geo_transform: GeoTransform,
    projection: String,
    data: Option<PixelBuffer>,
    overviews: Vec<OverviewLevel>,
}

impl PlanarSink {
    fn header(&self) -> Header {
        let s = self.options.structure;
        Header {
            width: s.width,
            height: s.height,
            bands: s.bands as u32,
            sample_type: s.sample_type,
            geo_transform: self.geo_transform,
            projection: self.projection.clone(),
            block_size: self.options.block_size,
            compression: self.options.compression,
            levels: Vec::new(),
        }
    }
}

impl RasterSink for PlanarSink {
    fn set_geo_transform(&mut self, transform: GeoTransform) {
        self.geo_transform = transform;
    }

    fn set_projection(&mut self, projection: &str) {
        self.projection = projection.to_string();
    }

    fn write(&mut self, buffer: &PixelBuffer) -> Result<(), RasterError> {
        let s = self.options.structure;
        buffer.check(s.sample_type, s.sample_count())?;
        self.data = Some(buffer.clone());
        self.overviews.clear();
        Ok(())
    }

    fn build_overviews(&mut self, resampling: Resampling) -> Result<(), RasterError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| RasterError::InvalidState("overviews requested before write".into()))?;
        let s = self.options.structure;
        self.overviews = overview::build(
            data,
            s.width,
            s.height,
            s.bands,
            self.options.block_size,
            resampling,
        );
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), RasterError> {
        let s = self.options.structure;
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| RasterError::InvalidState("closed before write".into()))?;

        let mut levels = Vec::with_capacity(1 + self.overviews.len());
        levels.push(encode_level(
            data,
            s.width,
            s.height,
            s.bands,
            self.options.block_size,
            self.options.compression,
        )?);
        for level in &self.overviews {
            levels.push(encode_level(
                &level.data,
                level.width,
                level.height,
                s.bands,
                self.options.block_size,
                self.options.compression,
            )?);
        }

        let mut out = BufWriter::new(File::create(&self.path)?);
        let written = format::write_container(
            &mut out,
            &self.header(),
            &levels,
            BlockOrder::FullResolutionFirst,
        )?;
        out.into_inner()
            .map_err(|e| RasterError::Io(e.into_error()))?
            .sync_all()?;

        debug!(
            path = %self.path.display(),
            bytes = written,
            levels = levels.len(),
            "Wrote planar raster"
        );
        Ok(())
    }
}

/// Compress every block of a level in parallel.
pub(crate) fn encode_level(
    data: &PixelBuffer,
    width: u32,
    height: u32,
    bands: usize,
    block_size: u32,
    compression: Compression,
) -> Result<EncodedLevel, RasterError> {
    let blocks = match data {
        PixelBuffer::U8(v) => encode_blocks(v, width, height, bands, block_size, compression)?,
        PixelBuffer::U16(v) => encode_blocks(v, width, height, bands, block_size, compression)?,
    };
    Ok(EncodedLevel {
        width,
        height,
        blocks,
    })
}

fn encode_blocks<T: Sample>(
    plane: &[T],
    width: u32,
    height: u32,
    bands: usize,
    block_size: u32,
    compression: Compression,
) -> Result<Vec<Vec<u8>>, RasterError> {
    let count = (width.div_ceil(block_size) * height.div_ceil(block_size)) as usize;
    (0..count)
        .into_par_iter()
        .map(|index| {
            let window = format::block_window(width, height, block_size, index);
            format::encode_block(plane, width, height, bands, &window, compression)
        })
        .collect()
}
