//! Dispatch command - partition an extent and publish one job per tile.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use clearsky::config::ConfigFile;
use clearsky::dispatch::Dispatcher;
use clearsky::queue::{HttpPushPublisher, MemoryQueue, Publisher};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the dispatch command.
#[derive(Debug, Clone, Default, Args)]
pub struct DispatchArgs {
    /// Square extent in pixels
    #[arg(long)]
    pub extent: Option<u32>,

    /// Tile edge in pixels
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Publish at most this many tiles (0 for all)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Source dataset, oldest first (repeatable; replaces the configured list)
    #[arg(long = "dataset")]
    pub datasets: Vec<String>,

    /// File with one dataset identifier per line
    #[arg(long)]
    pub datasets_file: Option<PathBuf>,

    /// Prefix prepended to every dataset identifier
    #[arg(long)]
    pub source_prefix: Option<String>,

    /// Prefix of the per-tile output objects
    #[arg(long)]
    pub destination_prefix: Option<String>,

    /// Push endpoint the jobs are POSTed to
    #[arg(long)]
    pub push_endpoint: Option<String>,

    /// Subscription name placed in each envelope
    #[arg(long)]
    pub subscription: Option<String>,

    /// Seconds to wait for each publish (0 waits indefinitely; needed when
    /// posting straight to a worker, which answers after the job)
    #[arg(long)]
    pub publish_timeout: Option<u64>,

    /// Print the jobs as JSON lines instead of publishing them
    #[arg(long)]
    pub dry_run: bool,
}

impl DispatchArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ConfigFile) {
        let d = &mut config.dispatch;
        if let Some(extent) = self.extent {
            d.extent = extent;
        }
        if let Some(tile_size) = self.tile_size {
            d.tile_size = tile_size;
        }
        if let Some(limit) = self.limit {
            d.limit = (limit > 0).then_some(limit);
        }
        if !self.datasets.is_empty() {
            d.datasets = self.datasets.clone();
        }
        if let Some(file) = &self.datasets_file {
            d.datasets_file = Some(file.clone());
        }
        if let Some(prefix) = &self.source_prefix {
            d.source_prefix = prefix.clone();
        }
        if let Some(prefix) = &self.destination_prefix {
            d.destination_prefix = Some(prefix.clone());
        }
        if let Some(endpoint) = &self.push_endpoint {
            config.queue.push_endpoint = Some(endpoint.clone());
        }
        if let Some(subscription) = &self.subscription {
            config.queue.subscription = subscription.clone();
        }
        if let Some(secs) = self.publish_timeout {
            config.queue.publish_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }
}

/// Run the dispatch command.
pub fn run(config_path: Option<PathBuf>, args: DispatchArgs) -> Result<(), CliError> {
    let mut runner = CliRunner::new(config_path.as_deref())?;
    runner.log_startup("dispatch");
    args.apply(runner.config_mut());

    // Every required parameter is checked before anything is published.
    let config = runner.config();
    let plan = config.dispatch_plan()?;
    let subscription = config.queue.subscription.clone();

    if args.dry_run {
        let queue = Arc::new(MemoryQueue::new(subscription));
        runner.block_on(Dispatcher::new(queue.clone()).run(&plan))?;
        let mut jobs = queue
            .drain()
            .iter()
            .map(|envelope| envelope.job().map_err(|e| CliError::Usage(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        // Publishes complete in any order; print in tile order.
        jobs.sort_by_key(|job| (job.window.x(), job.window.y()));
        for job in jobs {
            println!("{}", String::from_utf8_lossy(&job.encode()?));
        }
        return Ok(());
    }

    let endpoint = config.push_endpoint()?.to_string();
    let timeout = config.queue.publish_timeout;
    let publisher: Arc<dyn Publisher> =
        Arc::new(HttpPushPublisher::new(&endpoint, subscription, timeout)?);
    info!(endpoint = %endpoint, timeout = ?timeout, "Publishing to push endpoint");

    let summary = runner.block_on(Dispatcher::new(publisher).run(&plan))?;
    println!("{}", summary);
    for window in &summary.failed_tiles {
        println!("  failed: {}", window);
    }

    if summary.is_complete() {
        Ok(())
    } else {
        Err(CliError::PublishFailures {
            failed: summary.failed,
            total: summary.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = ConfigFile::default();
        config.dispatch.datasets = vec!["configured.tif".into()];
        let args = DispatchArgs {
            extent: Some(100),
            tile_size: Some(30),
            limit: Some(0),
            datasets: vec!["a.tif".into(), "b.tif".into()],
            destination_prefix: Some("gs://out/".into()),
            publish_timeout: Some(0),
            ..DispatchArgs::default()
        };
        args.apply(&mut config);
        assert_eq!(config.queue.publish_timeout, None);

        let plan = config.dispatch_plan().unwrap();
        assert_eq!(plan.area.tile_count(), 16);
        assert_eq!(plan.datasets, vec!["a.tif", "b.tif"]);
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn test_empty_flags_keep_config() {
        let mut config = ConfigFile::default();
        config.dispatch.datasets = vec!["configured.tif".into()];
        DispatchArgs::default().apply(&mut config);
        assert_eq!(config.dispatch.datasets, vec!["configured.tif"]);
        assert_eq!(config.dispatch.tile_size, 512);
    }
}
