//! On-disk layout of the tiled planar container.
//!
//! ```text
//! offset 0   "CSKY"              magic
//!        4   u16 LE              version
//!        6   u64 LE              header length (L)
//!       14   bincode(Header)     L bytes
//!   14 + L   block payloads      order given by BlockOrder
//! ```
//!
//! The header lists every level (full resolution first) and, per level,
//! the absolute offset and length of each block in row-major order. A block
//! holds every band of its pixels in planar layout as little-endian samples,
//! optionally deflate-compressed. Edge blocks are clipped to the raster.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::raster::buffer::{decode_le, encode_le};
use crate::raster::{Compression, PixelBuffer, RasterError, Sample, SampleType};

pub const MAGIC: &[u8; 4] = b"CSKY";
pub const VERSION: u16 = 1;
/// Magic + version + header length.
pub const PREAMBLE_LEN: usize = 14;
/// Upper bound accepted for the encoded header.
pub const MAX_HEADER_LEN: u64 = 64 * 1024 * 1024;

/// Location of one compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub offset: u64,
    pub length: u64,
}

/// Block index of one resolution level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelIndex {
    pub width: u32,
    pub height: u32,
    pub blocks: Vec<BlockEntry>,
}

impl LevelIndex {
    pub fn columns(&self, block_size: u32) -> u32 {
        self.width.div_ceil(block_size)
    }

    pub fn rows(&self, block_size: u32) -> u32 {
        self.height.div_ceil(block_size)
    }

    /// Pixel window covered by block `index`.
    pub fn block_window(&self, block_size: u32, index: usize) -> Window {
        block_window(self.width, self.height, block_size, index)
    }
}

/// Container metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub sample_type: SampleType,
    pub geo_transform: GeoTransform,
    pub projection: String,
    pub block_size: u32,
    pub compression: Compression,
    /// Full resolution first, then each overview.
    pub levels: Vec<LevelIndex>,
}

impl Header {
    /// Check internal consistency; `id` names the raster in errors.
    pub fn validate(&self, id: &str) -> Result<(), RasterError> {
        let invalid = |reason: String| RasterError::InvalidFormat {
            id: id.to_string(),
            reason,
        };
        if self.block_size == 0 {
            return Err(invalid("block size is zero".into()));
        }
        if self.bands == 0 {
            return Err(invalid("no bands".into()));
        }
        let first = self
            .levels
            .first()
            .ok_or_else(|| invalid("no resolution levels".into()))?;
        if first.width != self.width || first.height != self.height {
            return Err(invalid(format!(
                "level 0 is {}x{}, raster is {}x{}",
                first.width, first.height, self.width, self.height
            )));
        }
        for (i, level) in self.levels.iter().enumerate() {
            let expected = (level.columns(self.block_size) * level.rows(self.block_size)) as usize;
            if level.blocks.len() != expected {
                return Err(invalid(format!(
                    "level {} has {} blocks, expected {}",
                    i,
                    level.blocks.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// Physical order of block payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrder {
    /// Full resolution first, as produced by the writer.
    FullResolutionFirst,
    /// Smallest overview first so previews sit near the header.
    OverviewsFirst,
}

/// Compressed payloads of one level, row-major.
#[derive(Debug, Clone)]
pub struct EncodedLevel {
    pub width: u32,
    pub height: u32,
    pub blocks: Vec<Vec<u8>>,
}

pub fn block_window(width: u32, height: u32, block_size: u32, index: usize) -> Window {
    let columns = width.div_ceil(block_size).max(1) as usize;
    let bx = (index % columns) as u32 * block_size;
    let by = (index / columns) as u32 * block_size;
    Window::new(
        bx,
        by,
        block_size.min(width - bx),
        block_size.min(height - by),
    )
}

/// Write a complete container.
///
/// `header.levels` is ignored and rebuilt from `levels`. Returns the number
/// of bytes written.
pub fn write_container<W: Write>(
    out: &mut W,
    header: &Header,
    levels: &[EncodedLevel],
    order: BlockOrder,
) -> Result<u64, RasterError> {
    let mut header = header.clone();
    header.levels = levels
        .iter()
        .map(|l| LevelIndex {
            width: l.width,
            height: l.height,
            blocks: l
                .blocks
                .iter()
                .map(|b| BlockEntry {
                    offset: 0,
                    length: b.len() as u64,
                })
                .collect(),
        })
        .collect();

    // Fixed-width integer encoding keeps the header length independent of
    // the offsets filled in below.
    let header_len = bincode::serialized_size(&header)?;
    let mut offset = PREAMBLE_LEN as u64 + header_len;
    for level in physical_order(levels.len(), order) {
        for entry in header.levels[level].blocks.iter_mut() {
            entry.offset = offset;
            offset += entry.length;
        }
    }
    let encoded = bincode::serialize(&header)?;
    if encoded.len() as u64 != header_len {
        return Err(RasterError::InvalidState(
            "header length changed while assigning offsets".into(),
        ));
    }

    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(&encoded)?;
    for level in physical_order(levels.len(), order) {
        for block in &levels[level].blocks {
            out.write_all(block)?;
        }
    }
    out.flush()?;
    Ok(offset)
}

fn physical_order(count: usize, order: BlockOrder) -> Vec<usize> {
    match order {
        BlockOrder::FullResolutionFirst => (0..count).collect(),
        BlockOrder::OverviewsFirst => (0..count).rev().collect(),
    }
}

/// Parse the preamble and return the header length.
pub fn parse_preamble(id: &str, bytes: &[u8]) -> Result<u64, RasterError> {
    let invalid = |reason: String| RasterError::InvalidFormat {
        id: id.to_string(),
        reason,
    };
    if bytes.len() < PREAMBLE_LEN {
        return Err(invalid(format!("truncated preamble ({} bytes)", bytes.len())));
    }
    if &bytes[0..4] != MAGIC {
        return Err(invalid("bad magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[6..14]);
    let header_len = u64::from_le_bytes(len);
    if header_len > MAX_HEADER_LEN {
        return Err(invalid(format!("header length {} too large", header_len)));
    }
    Ok(header_len)
}

/// Decode a full in-memory container's header.
pub fn read_header(id: &str, bytes: &[u8]) -> Result<Header, RasterError> {
    let header_len = parse_preamble(id, bytes)? as usize;
    let end = PREAMBLE_LEN + header_len;
    if bytes.len() < end {
        return Err(RasterError::InvalidFormat {
            id: id.to_string(),
            reason: "truncated header".into(),
        });
    }
    let header: Header = bincode::deserialize(&bytes[PREAMBLE_LEN..end])?;
    header.validate(id)?;
    Ok(header)
}

/// Rewrite an in-memory container with a different block order.
pub fn relayout(id: &str, bytes: &[u8], order: BlockOrder) -> Result<Vec<u8>, RasterError> {
    let header = read_header(id, bytes)?;
    let mut levels = Vec::with_capacity(header.levels.len());
    for level in &header.levels {
        let mut blocks = Vec::with_capacity(level.blocks.len());
        for entry in &level.blocks {
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            let payload = bytes.get(start..end).ok_or_else(|| RasterError::InvalidFormat {
                id: id.to_string(),
                reason: format!("block at {} runs past end of file", entry.offset),
            })?;
            blocks.push(payload.to_vec());
        }
        levels.push(EncodedLevel {
            width: level.width,
            height: level.height,
            blocks,
        });
    }
    let mut out = Vec::with_capacity(bytes.len());
    write_container(&mut out, &header, &levels, order)?;
    Ok(out)
}

/// Encode one block of a planar level.
pub fn encode_block<T: Sample>(
    plane: &[T],
    width: u32,
    height: u32,
    bands: usize,
    window: &Window,
    compression: Compression,
) -> Result<Vec<u8>, RasterError> {
    let samples = crate::raster::extract_window(plane, width, height, bands, window);
    let raw = encode_le(&samples);
    match compression {
        Compression::None => Ok(raw),
        Compression::Deflate { level } => {
            let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder.write_all(&raw)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decode one block into `samples` planar values.
pub fn decode_block(
    payload: &[u8],
    compression: Compression,
    sample_type: SampleType,
    samples: usize,
) -> Result<PixelBuffer, RasterError> {
    let raw = match compression {
        Compression::None => payload.to_vec(),
        Compression::Deflate { .. } => {
            let mut raw = Vec::with_capacity(samples * sample_type.size());
            DeflateDecoder::new(payload).read_to_end(&mut raw)?;
            raw
        }
    };
    let buffer = match sample_type {
        SampleType::U8 => PixelBuffer::U8(decode_le::<u8>(&raw)),
        SampleType::U16 => PixelBuffer::U16(decode_le::<u16>(&raw)),
    };
    buffer.check(sample_type, samples)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            width: 3,
            height: 3,
            bands: 1,
            sample_type: SampleType::U8,
            geo_transform: GeoTransform::identity(),
            projection: "EPSG:4326".into(),
            block_size: 2,
            compression: Compression::None,
            levels: Vec::new(),
        }
    }

    fn levels() -> Vec<EncodedLevel> {
        vec![
            EncodedLevel {
                width: 3,
                height: 3,
                blocks: vec![vec![1; 4], vec![2; 2], vec![3; 2], vec![4; 1]],
            },
            EncodedLevel {
                width: 2,
                height: 2,
                blocks: vec![vec![9; 4]],
            },
        ]
    }

    #[test]
    fn test_block_window_clips_edges() {
        assert_eq!(block_window(3, 3, 2, 0), Window::new(0, 0, 2, 2));
        assert_eq!(block_window(3, 3, 2, 1), Window::new(2, 0, 1, 2));
        assert_eq!(block_window(3, 3, 2, 3), Window::new(2, 2, 1, 1));
    }

    #[test]
    fn test_offsets_point_at_payloads() {
        let mut out = Vec::new();
        let written =
            write_container(&mut out, &header(), &levels(), BlockOrder::FullResolutionFirst)
                .unwrap();
        assert_eq!(written as usize, out.len());

        let parsed = read_header("t", &out).unwrap();
        let e = parsed.levels[0].blocks[1];
        assert_eq!(&out[e.offset as usize..(e.offset + e.length) as usize], &[2, 2]);
        let o = parsed.levels[1].blocks[0];
        assert_eq!(o.offset + o.length, out.len() as u64);
    }

    #[test]
    fn test_overviews_first_order() {
        let mut out = Vec::new();
        write_container(&mut out, &header(), &levels(), BlockOrder::FullResolutionFirst).unwrap();
        let optimized = relayout("t", &out, BlockOrder::OverviewsFirst).unwrap();
        assert_eq!(optimized.len(), out.len());

        let parsed = read_header("t", &optimized).unwrap();
        let overview = parsed.levels[1].blocks[0];
        let first_full = parsed.levels[0].blocks[0];
        assert!(overview.offset < first_full.offset);
        let payload = &optimized[overview.offset as usize..(overview.offset + 4) as usize];
        assert_eq!(payload, &[9, 9, 9, 9]);
    }

    #[test]
    fn test_bad_magic() {
        let err = parse_preamble("t", b"TIFF\x01\x00\0\0\0\0\0\0\0\0").unwrap_err();
        assert!(matches!(err, RasterError::InvalidFormat { .. }));
    }

    #[test]
    fn test_deflate_block_roundtrip() {
        let plane: Vec<u16> = (0..12).collect();
        let window = Window::new(1, 0, 2, 2);
        let payload = encode_block(&plane, 3, 2, 2, &window, Compression::default()).unwrap();
        let decoded = decode_block(&payload, Compression::default(), SampleType::U16, 8).unwrap();
        assert_eq!(decoded, PixelBuffer::U16(vec![1, 2, 4, 5, 7, 8, 10, 11]));
    }

    #[test]
    fn test_block_count_validated() {
        let mut h = header();
        h.levels = vec![LevelIndex {
            width: 3,
            height: 3,
            blocks: vec![],
        }];
        assert!(h.validate("t").is_err());
    }
}
