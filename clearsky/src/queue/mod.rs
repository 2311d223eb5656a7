//! Job queue transport.
//!
//! The dispatcher only needs to publish a job and learn whether the
//! transport accepted it. Delivery to workers is the transport's concern:
//! it is at-least-once, so workers must tolerate duplicates.

mod http;
mod memory;

pub use http::{HttpPushPublisher, DEFAULT_PUBLISH_TIMEOUT};
pub use memory::MemoryQueue;

use thiserror::Error;

use crate::job::{CompositeJob, JobError};
use crate::source::BoxFuture;

/// Errors raised by queue transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode job: {0}")]
    Encode(#[from] JobError),

    #[error("failed to encode envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("publish rejected with status {status}")]
    Rejected { status: u16 },

    #[error("queue closed")]
    Closed,
}

/// Publishes jobs to a queue.
pub trait Publisher: Send + Sync {
    /// Publish `job`, returning the transport's message id.
    fn publish<'a>(&'a self, job: &'a CompositeJob) -> BoxFuture<'a, Result<String, TransportError>>;
}
