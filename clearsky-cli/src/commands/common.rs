//! Types and helpers shared across CLI commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing::info;

use clearsky::cache::BlockCache;
use clearsky::composite::CompositePolicy;
use clearsky::config::{format_size, ConfigFile};
use clearsky::fetch::FetchFailurePolicy;
use clearsky::raster::planar::{PlanarDriver, PlanarOpener};
use clearsky::source::DefaultResolver;
use clearsky::storage::{CloudOptimizer, LocalObjectStore, Uploader};
use clearsky::worker::CompositeWorker;

use crate::error::CliError;

/// Compositing policy selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PolicyArg {
    /// Joint median over all bands (excludes nodata and saturated pixels)
    Joint,
    /// Independent median per band (excludes nodata only)
    PerChannel,
}

impl From<PolicyArg> for CompositePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Joint => CompositePolicy::JointMedian,
            PolicyArg::PerChannel => CompositePolicy::PerChannelMedian,
        }
    }
}

/// What the fetcher does with in-flight reads after one source fails.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FailureArg {
    /// Let sibling reads finish and discard their results
    Drain,
    /// Abort sibling reads immediately
    Cancel,
}

impl From<FailureArg> for FetchFailurePolicy {
    fn from(arg: FailureArg) -> Self {
        match arg {
            FailureArg::Drain => FetchFailurePolicy::Drain,
            FailureArg::Cancel => FetchFailurePolicy::Cancel,
        }
    }
}

/// Worker tuning flags; each overrides the matching `[worker]`/`[storage]` key.
#[derive(Debug, Clone, Default, Args)]
pub struct WorkerArgs {
    /// Maximum sources read at once
    #[arg(long)]
    pub fetch_concurrency: Option<usize>,

    /// Compositing policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Behaviour of in-flight reads after a source fails
    #[arg(long, value_enum)]
    pub fetch_failure: Option<FailureArg>,

    /// Job timeout in seconds (0 disables)
    #[arg(long)]
    pub job_timeout: Option<u64>,

    /// Root directory of the local object store
    #[arg(long)]
    pub storage_root: Option<PathBuf>,

    /// Parent directory for per-job scratch files
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}

impl WorkerArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ConfigFile) -> Result<(), CliError> {
        if let Some(n) = self.fetch_concurrency {
            if n == 0 {
                return Err(CliError::Usage(
                    "--fetch-concurrency must be greater than zero".to_string(),
                ));
            }
            config.worker.fetch_concurrency = n;
        }
        if let Some(policy) = self.policy {
            config.worker.policy = policy.into();
        }
        if let Some(failure) = self.fetch_failure {
            config.worker.fetch_failure = failure.into();
        }
        if let Some(secs) = self.job_timeout {
            config.worker.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(root) = &self.storage_root {
            config.storage.root = root.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            config.worker.scratch_dir = Some(dir.clone());
        }
        Ok(())
    }
}

/// Build a worker over the configured sources, cache and object store.
pub fn build_worker(config: &ConfigFile) -> Result<CompositeWorker, CliError> {
    let cache = Arc::new(BlockCache::new(config.cache.block_size, config.cache.blocks));
    let resolver = DefaultResolver::new()?;
    let opener = PlanarOpener::new(Arc::new(resolver)).with_cache(Arc::clone(&cache));
    let store = LocalObjectStore::new(&config.storage.root);
    let uploader = Uploader::new(Arc::new(store), Arc::new(CloudOptimizer));
    let options = config.worker.options();

    info!(
        fetch_concurrency = options.fetch.concurrency,
        policy = %options.policy,
        fetch_failure = %options.fetch.failure_policy,
        cache_block = %format_size(config.cache.block_size),
        cache_blocks = config.cache.blocks,
        store = %config.storage.root.display(),
        "Worker configured"
    );

    Ok(CompositeWorker::new(
        Arc::new(opener),
        Arc::new(PlanarDriver::new()),
        uploader,
        options,
    )
    .with_cache(cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args_override_config() {
        let mut config = ConfigFile::default();
        let args = WorkerArgs {
            fetch_concurrency: Some(3),
            policy: Some(PolicyArg::PerChannel),
            fetch_failure: Some(FailureArg::Cancel),
            job_timeout: Some(0),
            storage_root: Some(PathBuf::from("/tmp/objects")),
            scratch_dir: None,
        };
        args.apply(&mut config).unwrap();

        assert_eq!(config.worker.fetch_concurrency, 3);
        assert_eq!(config.worker.policy, CompositePolicy::PerChannelMedian);
        assert_eq!(config.worker.fetch_failure, FetchFailurePolicy::Cancel);
        assert_eq!(config.worker.job_timeout, None);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/objects"));
    }

    #[test]
    fn test_absent_args_keep_config() {
        let mut config = ConfigFile::default();
        WorkerArgs::default().apply(&mut config).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let args = WorkerArgs {
            fetch_concurrency: Some(0),
            ..WorkerArgs::default()
        };
        assert!(args.apply(&mut ConfigFile::default()).is_err());
    }
}
