//! Per-pixel fusion of co-registered source windows.
//!
//! # Joint median (default)
//!
//! For each pixel the observations of every source form a vector of band
//! values. Vectors containing a nodata (zero) or saturated (type maximum)
//! channel are discarded. The survivors are ranked by the sum of their
//! channels, ties going to the earlier source, and the vector at rank
//! `count / 2` is copied to the output:
//!
//! ```text
//!  source   0            1          2             3
//!  pixel  (10,10,10)  (0,0,0)   (250,250,250)  (12,9,11)
//!                      nodata    kept (below u8::MAX)
//!  ranked:  (10,10,10)=30  (12,9,11)=32  (250,250,250)=750
//!  pick rank 3/2 = 1  ──► (12,9,11)
//! ```
//!
//! The output is always one real observation, never a blend of channels
//! from different dates. For an even count the lower of the two middle
//! elements is chosen.
//!
//! # Per-channel median
//!
//! The legacy policy takes an independent median per channel, skipping only
//! nodata values. It must be selected explicitly.

mod median;

pub use median::{joint_median, per_channel_median};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::raster::{PixelBuffer, Sample, SampleType};

/// Errors raised when the inputs cannot be fused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("no source buffers to composite")]
    NoInputs,

    #[error("band count must be at least 1")]
    ZeroBands,

    #[error("buffer {index} holds {actual} samples, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("buffer length {len} is not a multiple of {bands} bands")]
    PartialPixel { len: usize, bands: usize },

    #[error("buffer {index} is {actual}, expected {expected}")]
    SampleTypeMismatch {
        index: usize,
        expected: SampleType,
        actual: SampleType,
    },
}

/// How observations are fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositePolicy {
    /// Lower median of whole pixel vectors ranked by channel sum.
    #[default]
    JointMedian,
    /// Independent lower median per channel, nodata excluded.
    PerChannelMedian,
}

impl fmt::Display for CompositePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositePolicy::JointMedian => write!(f, "joint"),
            CompositePolicy::PerChannelMedian => write!(f, "per_channel"),
        }
    }
}

impl FromStr for CompositePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "joint" | "joint_median" => Ok(CompositePolicy::JointMedian),
            "per_channel" | "per-channel" | "legacy" => Ok(CompositePolicy::PerChannelMedian),
            other => Err(format!(
                "expected 'joint' or 'per_channel', got '{}'",
                other
            )),
        }
    }
}

/// Fuses N planar buffers into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compositor {
    policy: CompositePolicy,
    bands: usize,
}

impl Compositor {
    pub fn new(policy: CompositePolicy, bands: usize) -> Self {
        Self { policy, bands }
    }

    pub fn policy(&self) -> CompositePolicy {
        self.policy
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Fuse `inputs`, which must be in source order.
    ///
    /// CPU-bound; call from a blocking context.
    pub fn composite(&self, inputs: &[PixelBuffer]) -> Result<PixelBuffer, CompositeError> {
        self.validate(inputs)?;
        Ok(match inputs[0].sample_type() {
            SampleType::U8 => u8::into_buffer(self.run::<u8>(inputs)),
            SampleType::U16 => u16::into_buffer(self.run::<u16>(inputs)),
        })
    }

    fn run<T: Sample>(&self, inputs: &[PixelBuffer]) -> Vec<T> {
        let slices: Vec<&[T]> = inputs.iter().filter_map(|b| b.samples::<T>()).collect();
        match self.policy {
            CompositePolicy::JointMedian => joint_median(&slices, self.bands),
            CompositePolicy::PerChannelMedian => per_channel_median(&slices),
        }
    }

    fn validate(&self, inputs: &[PixelBuffer]) -> Result<(), CompositeError> {
        if self.bands == 0 {
            return Err(CompositeError::ZeroBands);
        }
        let first = inputs.first().ok_or(CompositeError::NoInputs)?;
        let expected = first.len();
        if expected % self.bands != 0 {
            return Err(CompositeError::PartialPixel {
                len: expected,
                bands: self.bands,
            });
        }
        for (index, buffer) in inputs.iter().enumerate() {
            if buffer.sample_type() != first.sample_type() {
                return Err(CompositeError::SampleTypeMismatch {
                    index,
                    expected: first.sample_type(),
                    actual: buffer.sample_type(),
                });
            }
            if buffer.len() != expected {
                return Err(CompositeError::LengthMismatch {
                    index,
                    expected,
                    actual: buffer.len(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(CompositePolicy::default(), crate::fetch::DEFAULT_BANDS)
    }
}
