//! Composite job handler.
//!
//! One delivery, one job:
//!
//! ```text
//!  envelope ─► CompositeJob ─► ParallelFetcher ─► Compositor ─► RasterWriter ─► Uploader
//!     │             │          (block cache)      (blocking)     (scratch dir)   (commit)
//!     ▼             ▼
//!  Rejected      Dropped            any failure ─► Failed (not acknowledged)
//! ```
//!
//! The queue client, object store and raster drivers are injected as
//! service objects. Every phase observes the job's [`CancellationToken`];
//! a timeout cancels it. Scratch files live in a per-job temporary
//! directory that is removed on every exit path, and the object write is
//! aborted unless the upload completes, so a failed or cancelled job never
//! leaves a partial output.

mod delivery;

pub use delivery::Delivery;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::BlockCache;
use crate::composite::{CompositeError, CompositePolicy, Compositor};
use crate::fetch::{FetchConfig, FetchError, ParallelFetcher};
use crate::grid::Window;
use crate::job::{CompositeJob, JobError, PushEnvelope};
use crate::raster::{DatasetOpener, RasterDriver, DEFAULT_OUTPUT_BLOCK_SIZE};
use crate::storage::{ObjectInfo, ObjectLocation, StorageError, UploadError, Uploader};
use crate::writer::{Georeference, RasterWriter, WriteError};

/// Default job timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors that fail a job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("invalid destination: {0}")]
    Destination(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("worker task failed: {0}")]
    Task(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("job timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(e: tokio::task::JoinError) -> Self {
        WorkerError::Task(e.to_string())
    }
}

/// Tunables for a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    pub fetch: FetchConfig,
    pub policy: CompositePolicy,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Parent of per-job scratch directories; the system default if unset.
    pub scratch_dir: Option<PathBuf>,
    pub output_block_size: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            policy: CompositePolicy::default(),
            timeout: Some(DEFAULT_JOB_TIMEOUT),
            scratch_dir: None,
            output_block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
        }
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub window: Window,
    pub sources: usize,
    pub object: ObjectInfo,
    pub fetch_time: Duration,
    pub composite_time: Duration,
    pub write_time: Duration,
    pub upload_time: Duration,
}

impl JobReport {
    pub fn total_time(&self) -> Duration {
        self.fetch_time + self.composite_time + self.write_time + self.upload_time
    }
}

/// Runs composite jobs.
pub struct CompositeWorker {
    fetcher: ParallelFetcher,
    compositor: Compositor,
    writer: Arc<RasterWriter>,
    uploader: Uploader,
    cache: Option<Arc<BlockCache>>,
    timeout: Option<Duration>,
    scratch_dir: Option<PathBuf>,
}

impl CompositeWorker {
    pub fn new(
        opener: Arc<dyn DatasetOpener>,
        driver: Arc<dyn RasterDriver>,
        uploader: Uploader,
        options: WorkerOptions,
    ) -> Self {
        Self {
            fetcher: ParallelFetcher::new(opener, options.fetch),
            compositor: Compositor::new(options.policy, options.fetch.bands),
            writer: Arc::new(RasterWriter::new(driver).with_block_size(options.output_block_size)),
            uploader,
            cache: None,
            timeout: options.timeout,
            scratch_dir: options.scratch_dir,
        }
    }

    /// Report this cache's statistics after each job.
    pub fn with_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn fetcher(&self) -> &ParallelFetcher {
        &self.fetcher
    }

    pub fn compositor(&self) -> Compositor {
        self.compositor
    }

    /// Handle one push delivery.
    pub async fn handle_delivery(&self, body: &[u8], cancel: &CancellationToken) -> Delivery {
        let envelope = match PushEnvelope::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Rejected malformed delivery");
                return Delivery::Rejected {
                    reason: e.to_string(),
                };
            }
        };
        let delivery_id = envelope.delivery_id().to_string();

        let job = match envelope.job() {
            Ok(job) => job,
            Err(e) => {
                // Redelivery cannot repair a bad payload; acknowledge and drop.
                warn!(delivery = %delivery_id, error = %e, "Dropped undecodable job");
                return Delivery::Dropped {
                    delivery_id,
                    reason: e.to_string(),
                };
            }
        };

        match self.process(&job, cancel).await {
            Ok(report) => Delivery::Completed {
                delivery_id,
                report,
            },
            Err(e) => {
                error!(delivery = %delivery_id, tile = %job.window, error = %e, "Composite job failed");
                Delivery::Failed {
                    delivery_id,
                    error: e,
                }
            }
        }
    }

    /// Run `job` under the worker's timeout.
    pub async fn process(
        &self,
        job: &CompositeJob,
        cancel: &CancellationToken,
    ) -> Result<JobReport, WorkerError> {
        job.validate()?;
        let token = cancel.child_token();

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.run(job, &token)).await {
                Ok(result) => result,
                Err(_) => {
                    token.cancel();
                    Err(WorkerError::TimedOut(limit))
                }
            },
            None => self.run(job, &token).await,
        };

        if let Some(cache) = &self.cache {
            debug!(cache = %cache.stats(), "Block cache statistics");
        }
        result
    }

    async fn run(
        &self,
        job: &CompositeJob,
        cancel: &CancellationToken,
    ) -> Result<JobReport, WorkerError> {
        let destination = ObjectLocation::parse(&job.destination)?;
        info!(
            tile = %job.window,
            sources = job.datasets.len(),
            destination = %destination,
            "Processing composite job"
        );

        let phase = Instant::now();
        let batch = self.fetcher.fetch(&job.datasets, job.window, cancel).await?;
        let fetch_time = phase.elapsed();
        let sources = batch.len();
        let georeference = Georeference::from_source(batch.reference());
        ensure_live(cancel)?;

        let phase = Instant::now();
        let compositor = self.compositor;
        let pixels = batch.into_pixels();
        let composite =
            tokio::task::spawn_blocking(move || compositor.composite(&pixels)).await??;
        let composite_time = phase.elapsed();
        ensure_live(cancel)?;

        let scratch = self.scratch()?;
        let local = scratch.path().join(destination.file_name());

        let phase = Instant::now();
        let writer = Arc::clone(&self.writer);
        let window = job.window;
        let bands = compositor.bands();
        let path = local.clone();
        tokio::task::spawn_blocking(move || {
            writer.write(&path, &window, &georeference, bands, &composite)
        })
        .await??;
        let write_time = phase.elapsed();
        ensure_live(cancel)?;

        let phase = Instant::now();
        let object = self.uploader.upload(&local, &destination, cancel).await?;
        let upload_time = phase.elapsed();
        drop(scratch);

        let report = JobReport {
            window: job.window,
            sources,
            object,
            fetch_time,
            composite_time,
            write_time,
            upload_time,
        };
        debug!(
            tile = %job.window,
            fetch_ms = fetch_time.as_millis() as u64,
            composite_ms = composite_time.as_millis() as u64,
            write_ms = write_time.as_millis() as u64,
            upload_ms = upload_time.as_millis() as u64,
            "Job phase timings"
        );
        info!(
            tile = %job.window,
            object = %report.object.location,
            bytes = report.object.size,
            sha256 = %report.object.sha256,
            "Uploaded composite"
        );
        Ok(report)
    }

    fn scratch(&self) -> Result<tempfile::TempDir, WorkerError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("clearsky-");
            b
        };
        match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(WorkerError::Scratch)
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), WorkerError> {
    if cancel.is_cancelled() {
        Err(WorkerError::Cancelled)
    } else {
        Ok(())
    }
}
