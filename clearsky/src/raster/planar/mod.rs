//! Tiled planar container driver.
//!
//! A small cloud-friendly raster format: a fixed preamble, a bincode header
//! carrying georeferencing and a block index, then independently
//! deflate-compressed square blocks for the full-resolution level and each
//! overview. Windows are read with one byte-range request per touched block,
//! so the format works equally well from local disk and object storage.
//!
//! See [`format`] for the byte layout.

pub mod format;
mod reader;
mod writer;

pub use format::BlockOrder;
pub use reader::{PlanarDataset, PlanarOpener};
pub use writer::PlanarDriver;

use crate::geo::GeoTransform;
use crate::raster::{overview, CreateOptions, PixelBuffer, RasterError, Resampling};

/// Encode a complete container in memory.
///
/// Used to stage fixtures and by tools that produce inputs without going
/// through a file.
pub fn encode_container(
    options: &CreateOptions,
    geo_transform: GeoTransform,
    projection: &str,
    data: &PixelBuffer,
    overviews: Option<Resampling>,
) -> Result<Vec<u8>, RasterError> {
    let s = options.structure;
    data.check(s.sample_type, s.sample_count())?;

    let mut levels = vec![writer::encode_level(
        data,
        s.width,
        s.height,
        s.bands,
        options.block_size,
        options.compression,
    )?];
    if let Some(resampling) = overviews {
        for level in overview::build(data, s.width, s.height, s.bands, options.block_size, resampling)
        {
            levels.push(writer::encode_level(
                &level.data,
                level.width,
                level.height,
                s.bands,
                options.block_size,
                options.compression,
            )?);
        }
    }

    let header = format::Header {
        width: s.width,
        height: s.height,
        bands: s.bands as u32,
        sample_type: s.sample_type,
        geo_transform,
        projection: projection.to_string(),
        block_size: options.block_size,
        compression: options.compression,
        levels: Vec::new(),
    };
    let mut out = Vec::new();
    format::write_container(&mut out, &header, &levels, BlockOrder::FullResolutionFirst)?;
    Ok(out)
}
