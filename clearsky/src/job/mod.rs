//! Composite job records.
//!
//! A [`CompositeJob`] is the unit of work exchanged between the dispatcher
//! and workers. It is immutable once built and travels through the queue as
//! JSON:
//!
//! ```json
//! {
//!   "datasets": ["gs://bucket/T31TCJ_20230102T104441_TCI.tif", "..."],
//!   "window": [512, 1024, 512, 512],
//!   "destination": "gs://results/tile512-1024.tif"
//! }
//! ```
//!
//! The destination is a pure function of the destination prefix and the
//! tile origin, so redelivering or re-dispatching a tile always targets the
//! same object.

mod envelope;

pub use envelope::{EnvelopeError, PushEnvelope, PushMessage};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Window;

/// File extension used for composite outputs.
pub const OUTPUT_EXTENSION: &str = "tif";

/// Errors raised while building or decoding a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job lists no source datasets.
    #[error("job has no source datasets")]
    NoDatasets,

    /// The window covers no pixels.
    #[error("job window {0} is empty")]
    EmptyWindow(Window),

    /// The destination path is blank.
    #[error("job destination is empty")]
    EmptyDestination,

    /// The payload is not a valid job record.
    #[error("invalid job payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A request to composite one tile from an ordered stack of sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeJob {
    /// Source dataset identifiers, time-ordered. The first is authoritative
    /// for georeferencing.
    pub datasets: Vec<String>,

    /// Pixel window to composite.
    pub window: Window,

    /// Object path the result is written to.
    pub destination: String,
}

impl CompositeJob {
    /// Build and validate a job.
    pub fn new(
        datasets: Vec<String>,
        window: Window,
        destination: impl Into<String>,
    ) -> Result<Self, JobError> {
        let job = Self {
            datasets,
            window,
            destination: destination.into(),
        };
        job.validate()?;
        Ok(job)
    }

    /// Build the job for `window` under `destination_prefix`.
    pub fn for_tile(
        datasets: Vec<String>,
        window: Window,
        destination_prefix: &str,
    ) -> Result<Self, JobError> {
        Self::new(
            datasets,
            window,
            destination_for(destination_prefix, &window),
        )
    }

    /// Check the invariants a worker relies on.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.datasets.is_empty() {
            return Err(JobError::NoDatasets);
        }
        if self.window.is_empty() {
            return Err(JobError::EmptyWindow(self.window));
        }
        if self.destination.trim().is_empty() {
            return Err(JobError::EmptyDestination);
        }
        Ok(())
    }

    /// The dataset whose transform and projection the output inherits.
    pub fn reference_dataset(&self) -> Option<&str> {
        self.datasets.first().map(String::as_str)
    }

    /// Serialize for queue transport.
    pub fn encode(&self) -> Result<Vec<u8>, JobError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate a queue payload.
    pub fn decode(payload: &[u8]) -> Result<Self, JobError> {
        let job: Self = serde_json::from_slice(payload)?;
        job.validate()?;
        Ok(job)
    }
}

/// Deterministic destination for a tile: `{prefix}tile{x}-{y}.tif`.
pub fn destination_for(prefix: &str, window: &Window) -> String {
    format!(
        "{}tile{}-{}.{}",
        prefix,
        window.x(),
        window.y(),
        OUTPUT_EXTENSION
    )
}
