//! Input side of the planar container.
//!
//! Every read is a byte-range request against a [`RangeSource`]: one for the
//! preamble, one for the header, then one per block a window touches. When
//! the source is a [`CachedSource`] those ranges are served by the shared
//! block cache.

use std::sync::Arc;

use futures::future::try_join_all;
use futures::FutureExt;
use tracing::trace;

use super::format::{self, Header, PREAMBLE_LEN};
use crate::cache::{BlockCache, CachedSource};
use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::raster::{
    Dataset, DatasetOpener, PixelBuffer, RasterError, RasterStructure, Sample,
};
use crate::source::{BoxFuture, RangeSource, SourceResolver};

/// An open planar container.
pub struct PlanarDataset {
    source: Arc<dyn RangeSource>,
    header: Header,
}

impl PlanarDataset {
    /// Read and validate the header.
    pub async fn open(source: Arc<dyn RangeSource>) -> Result<Self, RasterError> {
        let id = source.id().to_string();
        let preamble = source.read_range(0, PREAMBLE_LEN).await?;
        let header_len = format::parse_preamble(&id, &preamble)? as usize;
        let encoded = source.read_range(PREAMBLE_LEN as u64, header_len).await?;
        if encoded.len() < header_len {
            return Err(RasterError::InvalidFormat {
                id,
                reason: "truncated header".into(),
            });
        }
        let header: Header = bincode::deserialize(&encoded)?;
        header.validate(&id)?;
        trace!(id = %id, width = header.width, height = header.height, "Opened planar raster");
        Ok(Self { source, header })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of resolution levels including full resolution.
    pub fn level_count(&self) -> usize {
        self.header.levels.len()
    }

    /// Read `window` from resolution `level` (0 is full resolution).
    pub async fn read_level_window(
        &self,
        level: usize,
        window: &Window,
    ) -> Result<PixelBuffer, RasterError> {
        let h = &self.header;
        let index = h.levels.get(level).ok_or_else(|| {
            RasterError::InvalidState(format!("level {} not present", level))
        })?;
        if !window.fits_within(index.width, index.height) {
            return Err(RasterError::WindowOutOfBounds {
                window: *window,
                width: index.width,
                height: index.height,
            });
        }
        let bands = h.bands as usize;
        let mut out = PixelBuffer::zeroed(h.sample_type, window.pixel_count() * bands);
        if window.is_empty() {
            return Ok(out);
        }

        let bs = h.block_size;
        let columns = index.columns(bs);
        let mut wanted = Vec::new();
        for by in window.y() / bs..=(window.bottom() - 1) / bs {
            for bx in window.x() / bs..=(window.right() - 1) / bs {
                wanted.push((by * columns + bx) as usize);
            }
        }

        let blocks = try_join_all(wanted.into_iter().map(|i| async move {
            let entry = index.blocks[i];
            let block_window = index.block_window(bs, i);
            let payload = self
                .source
                .read_range(entry.offset, entry.length as usize)
                .await?;
            let samples = format::decode_block(
                &payload,
                h.compression,
                h.sample_type,
                block_window.pixel_count() * bands,
            )?;
            Ok::<_, RasterError>((block_window, samples))
        }))
        .await?;

        for (block_window, samples) in blocks {
            match (&mut out, &samples) {
                (PixelBuffer::U8(dst), PixelBuffer::U8(src)) => {
                    copy_block(dst, window, src, &block_window, bands)
                }
                (PixelBuffer::U16(dst), PixelBuffer::U16(src)) => {
                    copy_block(dst, window, src, &block_window, bands)
                }
                _ => {
                    return Err(RasterError::SampleTypeMismatch {
                        expected: h.sample_type,
                        actual: samples.sample_type(),
                    })
                }
            }
        }
        Ok(out)
    }
}

/// Copy the overlap of a decoded block into a window buffer.
fn copy_block<T: Sample>(
    dst: &mut [T],
    dst_window: &Window,
    src: &[T],
    src_window: &Window,
    bands: usize,
) {
    let Some(overlap) = dst_window.intersect(src_window) else {
        return;
    };
    let (dw, dh) = (dst_window.width() as usize, dst_window.height() as usize);
    let (sw, sh) = (src_window.width() as usize, src_window.height() as usize);
    let run = overlap.width() as usize;
    for band in 0..bands {
        for row in overlap.y()..overlap.bottom() {
            let s = band * sw * sh
                + (row - src_window.y()) as usize * sw
                + (overlap.x() - src_window.x()) as usize;
            let d = band * dw * dh
                + (row - dst_window.y()) as usize * dw
                + (overlap.x() - dst_window.x()) as usize;
            dst[d..d + run].copy_from_slice(&src[s..s + run]);
        }
    }
}

impl Dataset for PlanarDataset {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn structure(&self) -> RasterStructure {
        let h = &self.header;
        RasterStructure::new(h.width, h.height, h.bands as usize, h.sample_type)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.header.geo_transform
    }

    fn projection(&self) -> &str {
        &self.header.projection
    }

    fn read_window<'a>(
        &'a self,
        window: &'a Window,
    ) -> BoxFuture<'a, Result<PixelBuffer, RasterError>> {
        self.read_level_window(0, window).boxed()
    }
}

/// Opens planar containers through a resolver, optionally via a block cache.
pub struct PlanarOpener {
    resolver: Arc<dyn SourceResolver>,
    cache: Option<Arc<BlockCache>>,
}

impl PlanarOpener {
    pub fn new(resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            resolver,
            cache: None,
        }
    }

    /// Route every range read through `cache`.
    pub fn with_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl DatasetOpener for PlanarOpener {
    fn open<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Box<dyn Dataset>, RasterError>> {
        async move {
            let source = self.resolver.resolve(id)?;
            let source: Arc<dyn RangeSource> = match &self.cache {
                Some(cache) => Arc::new(CachedSource::new(source, Arc::clone(cache))),
                None => source,
            };
            let dataset = PlanarDataset::open(source).await?;
            Ok(Box::new(dataset) as Box<dyn Dataset>)
        }
        .boxed()
    }
}
