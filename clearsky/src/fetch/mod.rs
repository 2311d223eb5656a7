//! Parallel window fetcher.
//!
//! Given the source datasets of a job and the tile window, opens every
//! source and reads the window's pixels for all bands, running a bounded
//! number of sources at once.
//!
//! ```text
//!   ids ──► spawn one task per source ──► Semaphore (N permits)
//!                                              │
//!                                     open ─► validate ─► read window
//!                                              │
//!   FetchBatch ◄── slot[index] ◄───────────────┘
//! ```
//!
//! Results are stored by source index, never by completion order, so the
//! batch is identical however the reads interleave. On the first failure the
//! batch fails; depending on [`FetchFailurePolicy`] the remaining reads are
//! either allowed to finish or cancelled.

mod policy;

pub use policy::FetchFailurePolicy;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::geo::GeoTransform;
use crate::grid::Window;
use crate::raster::{DatasetOpener, PixelBuffer, RasterError, RasterStructure, SampleType};

/// Default number of sources read at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;

/// Default number of bands each source must have.
pub const DEFAULT_BANDS: usize = 3;

/// Errors raised while fetching a job's source windows.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no source datasets")]
    NoSources,

    #[error("failed to open {id}: {source}")]
    Open {
        id: String,
        #[source]
        source: RasterError,
    },

    #[error("failed to read window from {id}: {source}")]
    Read {
        id: String,
        #[source]
        source: RasterError,
    },

    #[error("{id} has {actual} band(s), expected {expected}")]
    BandCount {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("window {window} outside {id} ({width}x{height})")]
    OutOfBounds {
        id: String,
        window: Window,
        width: u32,
        height: u32,
    },

    #[error("{id} has sample type {actual}, expected {expected}")]
    SampleTypeMismatch {
        id: String,
        expected: SampleType,
        actual: SampleType,
    },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Fetcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum sources read at once.
    pub concurrency: usize,
    /// Band count every source must have.
    pub bands: usize,
    pub failure_policy: FetchFailurePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            bands: DEFAULT_BANDS,
            failure_policy: FetchFailurePolicy::default(),
        }
    }
}

/// Window pixels and metadata of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSource {
    pub id: String,
    pub structure: RasterStructure,
    pub geo_transform: GeoTransform,
    pub projection: String,
    /// Planar window samples for every band.
    pub pixels: PixelBuffer,
}

/// All source windows of a job, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch {
    window: Window,
    sources: Vec<FetchedSource>,
}

impl FetchBatch {
    pub fn window(&self) -> Window {
        self.window
    }

    pub fn sources(&self) -> &[FetchedSource] {
        &self.sources
    }

    /// The first source; georeferencing of the output is taken from it.
    pub fn reference(&self) -> &FetchedSource {
        &self.sources[0]
    }

    pub fn sample_type(&self) -> SampleType {
        self.reference().pixels.sample_type()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Consume into the per-source pixel buffers, in source order.
    pub fn into_pixels(self) -> Vec<PixelBuffer> {
        self.sources.into_iter().map(|s| s.pixels).collect()
    }
}

/// Reads a window from many sources with bounded parallelism.
pub struct ParallelFetcher {
    opener: Arc<dyn DatasetOpener>,
    config: FetchConfig,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ParallelFetcher {
    pub fn new(opener: Arc<dyn DatasetOpener>, config: FetchConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            opener,
            config: FetchConfig {
                concurrency,
                ..config
            },
            permits: Arc::new(Semaphore::new(concurrency)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> FetchConfig {
        self.config
    }

    /// Highest number of sources observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Fetch `window` from every dataset in `ids`.
    ///
    /// The permit pool is shared across calls, so concurrent jobs on the
    /// same fetcher together stay within the configured bound.
    pub async fn fetch(
        &self,
        ids: &[String],
        window: Window,
        cancel: &CancellationToken,
    ) -> Result<FetchBatch, FetchError> {
        if ids.is_empty() {
            return Err(FetchError::NoSources);
        }

        let token = cancel.child_token();
        let mut tasks = JoinSet::new();
        for (index, id) in ids.iter().enumerate() {
            let opener = Arc::clone(&self.opener);
            let permits = Arc::clone(&self.permits);
            let gauge = Gauge {
                current: Arc::clone(&self.in_flight),
                peak: Arc::clone(&self.peak_in_flight),
            };
            let token = token.clone();
            let id = id.clone();
            let bands = self.config.bands;

            tasks.spawn(async move {
                let result = tokio::select! {
                    _ = token.cancelled() => Err(FetchError::Cancelled),
                    result = fetch_limited(opener, permits, gauge, &id, window, bands) => result,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<FetchedSource>> = vec![None; ids.len()];
        let mut first_error: Option<FetchError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => (usize::MAX, Err(FetchError::Task(e.to_string()))),
            };
            match result {
                Ok(source) => slots[index] = Some(source),
                Err(FetchError::Cancelled) if first_error.is_some() => {}
                Err(e) => {
                    if first_error.is_none() {
                        warn!(error = %e, window = %window, "Source fetch failed");
                        if self.config.failure_policy == FetchFailurePolicy::Cancel {
                            token.cancel();
                            tasks.abort_all();
                        }
                        first_error = Some(e);
                    } else {
                        debug!(error = %e, "Additional source fetch failure");
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let sources: Vec<FetchedSource> = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| FetchError::Task("source result missing".into()))?;

        let expected = sources[0].pixels.sample_type();
        if let Some(odd) = sources.iter().find(|s| s.pixels.sample_type() != expected) {
            return Err(FetchError::SampleTypeMismatch {
                id: odd.id.clone(),
                expected,
                actual: odd.pixels.sample_type(),
            });
        }

        debug!(sources = sources.len(), window = %window, "Fetched source windows");
        Ok(FetchBatch { window, sources })
    }
}

/// Wait for a permit, then fetch one source while holding it.
async fn fetch_limited(
    opener: Arc<dyn DatasetOpener>,
    permits: Arc<Semaphore>,
    gauge: Gauge,
    id: &str,
    window: Window,
    bands: usize,
) -> Result<FetchedSource, FetchError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| FetchError::Task(e.to_string()))?;
    let _guard = gauge.enter();
    fetch_one(opener.as_ref(), id, window, bands).await
}

/// Open, validate and read one source. The dataset is closed on return.
async fn fetch_one(
    opener: &dyn DatasetOpener,
    id: &str,
    window: Window,
    bands: usize,
) -> Result<FetchedSource, FetchError> {
    let dataset = opener.open(id).await.map_err(|source| FetchError::Open {
        id: id.to_string(),
        source,
    })?;
    let structure = dataset.structure();

    if structure.bands != bands {
        return Err(FetchError::BandCount {
            id: id.to_string(),
            expected: bands,
            actual: structure.bands,
        });
    }
    if !window.fits_within(structure.width, structure.height) {
        return Err(FetchError::OutOfBounds {
            id: id.to_string(),
            window,
            width: structure.width,
            height: structure.height,
        });
    }

    let pixels = dataset
        .read_window(&window)
        .await
        .map_err(|source| FetchError::Read {
            id: id.to_string(),
            source,
        })?;

    Ok(FetchedSource {
        id: id.to_string(),
        structure,
        geo_transform: dataset.geo_transform(),
        projection: dataset.projection().to_string(),
        pixels,
    })
}

/// Tracks in-flight reads and their peak.
struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    fn enter(&self) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard {
            current: Arc::clone(&self.current),
        }
    }
}

struct GaugeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
