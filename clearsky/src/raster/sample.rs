//! Sample types supported by the pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PixelBuffer;

/// Storage type of one channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    U8,
    U16,
}

impl SampleType {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleType::U8 => write!(f, "u8"),
            SampleType::U16 => write!(f, "u16"),
        }
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "u8" | "byte" | "uint8" => Ok(SampleType::U8),
            "u16" | "uint16" => Ok(SampleType::U16),
            other => Err(format!("unsupported sample type '{}'", other)),
        }
    }
}

/// A channel value type.
///
/// `NODATA` (zero) marks a missing observation and `SATURATED` (the type's
/// maximum) an unreliable one.
pub trait Sample: Copy + Default + Ord + Send + Sync + fmt::Debug + 'static {
    const SAMPLE_TYPE: SampleType;
    const NODATA: Self;
    const SATURATED: Self;

    /// Widen for arithmetic.
    fn to_u32(self) -> u32;

    /// Narrow from arithmetic, clamping to the representable range.
    fn from_u32_clamped(value: u32) -> Self;

    /// Append the little-endian encoding.
    fn put_le(self, out: &mut Vec<u8>);

    /// Decode from little-endian bytes (`bytes.len() == SAMPLE_TYPE.size()`).
    fn get_le(bytes: &[u8]) -> Self;

    /// Borrow the samples of a buffer of this type.
    fn view(buffer: &PixelBuffer) -> Option<&[Self]>;

    /// Wrap samples of this type in a buffer.
    fn into_buffer(samples: Vec<Self>) -> PixelBuffer;

    /// True for the nodata or saturation sentinel.
    fn is_sentinel(self) -> bool {
        self == Self::NODATA || self == Self::SATURATED
    }
}

impl Sample for u8 {
    const SAMPLE_TYPE: SampleType = SampleType::U8;
    const NODATA: Self = 0;
    const SATURATED: Self = u8::MAX;

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn from_u32_clamped(value: u32) -> Self {
        value.min(u32::from(u8::MAX)) as u8
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn get_le(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn view(buffer: &PixelBuffer) -> Option<&[Self]> {
        match buffer {
            PixelBuffer::U8(v) => Some(v),
            _ => None,
        }
    }

    fn into_buffer(samples: Vec<Self>) -> PixelBuffer {
        PixelBuffer::U8(samples)
    }
}

impl Sample for u16 {
    const SAMPLE_TYPE: SampleType = SampleType::U16;
    const NODATA: Self = 0;
    const SATURATED: Self = u16::MAX;

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn from_u32_clamped(value: u32) -> Self {
        value.min(u32::from(u16::MAX)) as u16
    }

    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn get_le(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn view(buffer: &PixelBuffer) -> Option<&[Self]> {
        match buffer {
            PixelBuffer::U16(v) => Some(v),
            _ => None,
        }
    }

    fn into_buffer(samples: Vec<Self>) -> PixelBuffer {
        PixelBuffer::U16(samples)
    }
}
