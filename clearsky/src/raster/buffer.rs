//! Typed planar pixel buffers.

use super::{RasterError, Sample, SampleType};

/// Planar pixel data of one sample type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelBuffer {
    /// A buffer of `len` nodata samples.
    pub fn zeroed(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::U8 => PixelBuffer::U8(vec![0; len]),
            SampleType::U16 => PixelBuffer::U16(vec![0; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            PixelBuffer::U8(_) => SampleType::U8,
            PixelBuffer::U16(_) => SampleType::U16,
        }
    }

    /// Number of samples (not bytes).
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as samples of type `T`, if the buffer holds that type.
    pub fn samples<T: Sample>(&self) -> Option<&[T]> {
        T::view(self)
    }

    /// Little-endian byte encoding of all samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            PixelBuffer::U8(v) => v.clone(),
            PixelBuffer::U16(v) => encode_le(v),
        }
    }

    /// Decode little-endian bytes into a buffer of `sample_type`.
    pub fn from_le_bytes(sample_type: SampleType, bytes: &[u8]) -> Result<Self, RasterError> {
        let size = sample_type.size();
        if bytes.len() % size != 0 {
            return Err(RasterError::BufferSize {
                expected: bytes.len() / size * size,
                actual: bytes.len(),
            });
        }
        Ok(match sample_type {
            SampleType::U8 => PixelBuffer::U8(bytes.to_vec()),
            SampleType::U16 => PixelBuffer::U16(decode_le(bytes)),
        })
    }

    /// Fail unless the buffer holds `expected` samples of `sample_type`.
    pub fn check(&self, sample_type: SampleType, expected: usize) -> Result<(), RasterError> {
        if self.sample_type() != sample_type {
            return Err(RasterError::SampleTypeMismatch {
                expected: sample_type,
                actual: self.sample_type(),
            });
        }
        if self.len() != expected {
            return Err(RasterError::BufferSize {
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

impl From<Vec<u8>> for PixelBuffer {
    fn from(v: Vec<u8>) -> Self {
        PixelBuffer::U8(v)
    }
}

impl From<Vec<u16>> for PixelBuffer {
    fn from(v: Vec<u16>) -> Self {
        PixelBuffer::U16(v)
    }
}

pub(crate) fn encode_le<T: Sample>(samples: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * T::SAMPLE_TYPE.size());
    for s in samples {
        s.put_le(&mut out);
    }
    out
}

pub(crate) fn decode_le<T: Sample>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::SAMPLE_TYPE.size())
        .map(T::get_le)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed() {
        let buf = PixelBuffer::zeroed(SampleType::U16, 6);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.sample_type(), SampleType::U16);
        assert!(buf.samples::<u16>().unwrap().iter().all(|&v| v == 0));
        assert!(buf.samples::<u8>().is_none());
    }

    #[test]
    fn test_u16_bytes() {
        let buf = PixelBuffer::from(vec![1u16, 256, 65535]);
        let bytes = buf.to_le_bytes();
        assert_eq!(bytes, vec![1, 0, 0, 1, 255, 255]);
        assert_eq!(PixelBuffer::from_le_bytes(SampleType::U16, &bytes).unwrap(), buf);
    }

    #[test]
    fn test_odd_byte_count_rejected() {
        assert!(matches!(
            PixelBuffer::from_le_bytes(SampleType::U16, &[1, 2, 3]),
            Err(RasterError::BufferSize { .. })
        ));
    }

    #[test]
    fn test_check() {
        let buf = PixelBuffer::from(vec![0u8; 12]);
        assert!(buf.check(SampleType::U8, 12).is_ok());
        assert!(matches!(
            buf.check(SampleType::U8, 10),
            Err(RasterError::BufferSize { expected: 10, actual: 12 })
        ));
        assert!(matches!(
            buf.check(SampleType::U16, 12),
            Err(RasterError::SampleTypeMismatch { .. })
        ));
    }
}
