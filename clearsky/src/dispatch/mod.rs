//! Job dispatcher.
//!
//! Partitions an area of interest into tiles and publishes one
//! [`CompositeJob`] per tile:
//!
//! ```text
//!  AreaOfInterest ──tiles()──► CompositeJob ──spawn──► Publisher::publish
//!                                                            │
//!                        DispatchSummary ◄── join all ◄──────┘
//!                                             (failures counted atomically)
//! ```
//!
//! Publishes run concurrently. A failed publish is logged and counted but
//! never retried here; the summary lists the failed tiles so they can be
//! resubmitted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::grid::{AreaOfInterest, GridError, Window};
use crate::job::{CompositeJob, JobError};
use crate::queue::Publisher;

/// Errors that stop a dispatch run before anything is published.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no source datasets configured")]
    NoDatasets,

    #[error("no destination prefix configured")]
    NoDestination,

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// What to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub area: AreaOfInterest,
    /// Ordered source identifiers shared by every job.
    pub datasets: Vec<String>,
    pub destination_prefix: String,
    /// Stop after this many tiles.
    pub limit: Option<usize>,
}

impl DispatchPlan {
    pub fn new(
        area: AreaOfInterest,
        datasets: Vec<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        Self {
            area,
            datasets,
            destination_prefix: destination_prefix.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    fn validate(&self) -> Result<(), DispatchError> {
        if self.datasets.is_empty() {
            return Err(DispatchError::NoDatasets);
        }
        if self.destination_prefix.trim().is_empty() {
            return Err(DispatchError::NoDestination);
        }
        Ok(())
    }

    /// Jobs in tile order.
    pub fn jobs(&self) -> Result<Vec<CompositeJob>, DispatchError> {
        self.validate()?;
        self.area
            .tiles_limited(self.limit)
            .map(|window| {
                CompositeJob::for_tile(self.datasets.clone(), window, &self.destination_prefix)
                    .map_err(DispatchError::from)
            })
            .collect()
    }
}

/// Outcome of a dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: u64,
    pub published: u64,
    pub failed: u64,
    /// Failed tiles in tile order.
    pub failed_tiles: Vec<Window>,
    pub elapsed: Duration,
}

impl DispatchSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} jobs published, {} failed in {:.1}s",
            self.published,
            self.total,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Publishes a plan's jobs.
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// Publish every job of `plan` and wait for all publishes to settle.
    pub async fn run(&self, plan: &DispatchPlan) -> Result<DispatchSummary, DispatchError> {
        let start = Instant::now();
        let jobs = plan.jobs()?;
        let total = jobs.len() as u64;
        let failures = Arc::new(AtomicU64::new(0));

        info!(
            tiles = total,
            datasets = plan.datasets.len(),
            width = plan.area.width(),
            height = plan.area.height(),
            tile_size = plan.area.tile_size(),
            "Dispatching composite jobs"
        );

        let mut tasks = JoinSet::new();
        for (order, job) in jobs.into_iter().enumerate() {
            let publisher = Arc::clone(&self.publisher);
            let failures = Arc::clone(&failures);
            tasks.spawn(async move {
                match publisher.publish(&job).await {
                    Ok(message_id) => {
                        info!(tile = %job.window, message_id = %message_id, "Published job");
                        None
                    }
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!(tile = %job.window, error = %e, "Failed to publish job");
                        Some((order, job.window))
                    }
                }
            });
        }

        let mut failed_tiles = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(failed)) => failed_tiles.push(failed),
                Ok(None) => {}
                Err(e) => {
                    // A panicked publish task never reported; count it here.
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Publish task failed");
                }
            }
        }
        failed_tiles.sort_by_key(|(order, _)| *order);

        let failed = failures.load(Ordering::Relaxed);
        let summary = DispatchSummary {
            total,
            published: total.saturating_sub(failed),
            failed,
            failed_tiles: failed_tiles.into_iter().map(|(_, w)| w).collect(),
            elapsed: start.elapsed(),
        };
        if summary.is_complete() {
            info!(summary = %summary, "Dispatch complete");
        } else {
            warn!(summary = %summary, "Dispatch finished with failures");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, TransportError};
    use crate::source::BoxFuture;
    use futures::FutureExt;

    /// Fails every job whose tile starts at the given x offset.
    struct FlakyPublisher {
        inner: MemoryQueue,
        fail_x: u32,
    }

    impl Publisher for FlakyPublisher {
        fn publish<'a>(
            &'a self,
            job: &'a CompositeJob,
        ) -> BoxFuture<'a, Result<String, TransportError>> {
            if job.window.x() == self.fail_x {
                return futures::future::ready(Err(TransportError::Rejected { status: 503 }))
                    .boxed();
            }
            self.inner.publish(job)
        }
    }

    fn plan(extent: u32, tile: u32) -> DispatchPlan {
        DispatchPlan::new(
            AreaOfInterest::square(extent, tile).unwrap(),
            vec!["/vsigs/bucket/t1.tif".into(), "/vsigs/bucket/t2.tif".into()],
            "gs://out/median/",
        )
    }

    #[tokio::test]
    async fn test_publishes_one_job_per_tile() {
        let queue = Arc::new(MemoryQueue::new("median"));
        let summary = Dispatcher::new(queue.clone()).run(&plan(10, 4)).await.unwrap();

        assert_eq!(summary.total, 9);
        assert_eq!(summary.published, 9);
        assert!(summary.is_complete());

        let mut destinations: Vec<String> = queue
            .drain()
            .iter()
            .map(|e| e.job().unwrap().destination)
            .collect();
        destinations.sort();
        assert_eq!(destinations.len(), 9);
        assert!(destinations.contains(&"gs://out/median/tile8-8.tif".to_string()));
    }

    #[tokio::test]
    async fn test_jobs_carry_full_ordered_dataset_list() {
        let jobs = plan(8, 4).jobs().unwrap();
        assert_eq!(jobs.len(), 4);
        for job in &jobs {
            assert_eq!(job.datasets[0], "/vsigs/bucket/t1.tif");
            assert_eq!(job.datasets.len(), 2);
        }
        assert_eq!(jobs[1].window, Window::new(0, 4, 4, 4));
    }

    #[tokio::test]
    async fn test_limit_caps_tiles() {
        let queue = Arc::new(MemoryQueue::new("median"));
        let summary = Dispatcher::new(queue.clone())
            .run(&plan(10, 4).with_limit(Some(2)))
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_counted_not_retried() {
        let flaky = Arc::new(FlakyPublisher {
            inner: MemoryQueue::new("median"),
            fail_x: 4,
        });
        let summary = Dispatcher::new(flaky.clone()).run(&plan(10, 4)).await.unwrap();

        assert_eq!(summary.failed, 3);
        assert_eq!(summary.published, 6);
        assert_eq!(
            summary.failed_tiles,
            vec![
                Window::new(4, 0, 4, 4),
                Window::new(4, 4, 4, 4),
                Window::new(4, 8, 4, 2)
            ]
        );
        assert_eq!(flaky.inner.len(), 6);
        assert!(summary.to_string().starts_with("6 of 9 jobs published, 3 failed"));
    }

    #[tokio::test]
    async fn test_missing_inputs_rejected() {
        let queue = Arc::new(MemoryQueue::new("median"));
        let dispatcher = Dispatcher::new(queue);

        let mut no_data = plan(10, 4);
        no_data.datasets.clear();
        assert!(matches!(
            dispatcher.run(&no_data).await,
            Err(DispatchError::NoDatasets)
        ));

        let mut no_dest = plan(10, 4);
        no_dest.destination_prefix = " ".into();
        assert!(matches!(
            dispatcher.run(&no_dest).await,
            Err(DispatchError::NoDestination)
        ));
    }
}
