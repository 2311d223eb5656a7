//! Settings structs for each `[section]` of the INI config file.

use std::path::PathBuf;
use std::time::Duration;

use super::file::config_directory;
use crate::cache::{DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::composite::CompositePolicy;
use crate::fetch::{FetchConfig, FetchFailurePolicy, DEFAULT_BANDS, DEFAULT_FETCH_CONCURRENCY};
use crate::queue::DEFAULT_PUBLISH_TIMEOUT;
use crate::raster::DEFAULT_OUTPUT_BLOCK_SIZE;
use crate::worker::{WorkerOptions, DEFAULT_JOB_TIMEOUT};

/// Default square extent in pixels (one 10 m Sentinel-2 granule).
pub const DEFAULT_EXTENT: u32 = 10980;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default worker listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Default push subscription name.
pub const DEFAULT_SUBSCRIPTION: &str = "median";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "clearsky.log";

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub dispatch: DispatchSettings,
    pub worker: WorkerSettings,
    pub cache: CacheSettings,
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub logging: LoggingSettings,
}

/// `[dispatch]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Square extent in pixels.
    pub extent: u32,
    pub tile_size: u32,
    /// Tile cap; `None` dispatches every tile.
    pub limit: Option<usize>,
    /// Prepended to every dataset identifier.
    pub source_prefix: String,
    pub destination_prefix: Option<String>,
    /// Time-ordered dataset identifiers.
    pub datasets: Vec<String>,
    /// File with one dataset identifier per line, appended after `datasets`.
    pub datasets_file: Option<PathBuf>,
}

/// `[worker]`
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub fetch_concurrency: usize,
    pub bands: usize,
    pub policy: CompositePolicy,
    pub fetch_failure: FetchFailurePolicy,
    /// `None` disables the job timeout.
    pub job_timeout: Option<Duration>,
    pub listen: String,
    pub scratch_dir: Option<PathBuf>,
    pub output_block_size: u32,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Bytes per cached block.
    pub block_size: usize,
    /// Resident block cap.
    pub blocks: u64,
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Root directory of the local object store.
    pub root: PathBuf,
}

/// `[queue]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub push_endpoint: Option<String>,
    pub subscription: String,
    /// Per-publish request timeout; `None` waits indefinitely.
    pub publish_timeout: Option<Duration>,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            worker: WorkerSettings::default(),
            cache: CacheSettings::default(),
            storage: StorageSettings::default(),
            queue: QueueSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            tile_size: DEFAULT_TILE_SIZE,
            limit: None,
            source_prefix: String::new(),
            destination_prefix: None,
            datasets: Vec::new(),
            datasets_file: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            bands: DEFAULT_BANDS,
            policy: CompositePolicy::default(),
            fetch_failure: FetchFailurePolicy::default(),
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            listen: DEFAULT_LISTEN.to_string(),
            scratch_dir: None,
            output_block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            blocks: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: config_directory().join("objects"),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            push_endpoint: None,
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            publish_timeout: Some(DEFAULT_PUBLISH_TIMEOUT),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl WorkerSettings {
    /// Fetcher and compositor options for a [`crate::worker::CompositeWorker`].
    pub fn options(&self) -> WorkerOptions {
        WorkerOptions {
            fetch: FetchConfig {
                concurrency: self.fetch_concurrency,
                bands: self.bands,
                failure_policy: self.fetch_failure,
            },
            policy: self.policy,
            timeout: self.job_timeout,
            scratch_dir: self.scratch_dir.clone(),
            output_block_size: self.output_block_size,
        }
    }
}
