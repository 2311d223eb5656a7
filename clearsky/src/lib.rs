//! Clearsky - cloud-free composite mosaics from satellite time series
//!
//! This library builds per-tile composites from a stack of co-registered
//! raster images. A dispatcher partitions a large pixel extent into tiles
//! and publishes one [`job::CompositeJob`] per tile; a worker consumes a job,
//! reads the same window from every source concurrently, fuses the
//! observations per pixel and uploads a georeferenced, tiled result.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   publish    ┌─────────┐   deliver   ┌──────────────────┐
//! │ Dispatcher │ ───────────► │  Queue  │ ──────────► │ CompositeWorker  │
//! │  (grid)    │              └─────────┘             └────────┬─────────┘
//! └────────────┘                                               │
//!                    ┌──────────────────────────────────────────┤
//!                    ▼                                          │
//!          ┌──────────────────┐     ┌────────────┐              │
//!          │ ParallelFetcher  │ ──► │ BlockCache │ ─► sources   │
//!          └────────┬─────────┘     └────────────┘              │
//!                   ▼                                           │
//!            ┌────────────┐   ┌──────────────┐   ┌──────────┐   │
//!            │ Compositor │ ► │ RasterWriter │ ► │ Uploader │ ◄─┘
//!            └────────────┘   └──────────────┘   └──────────┘
//! ```

pub mod cache;
pub mod composite;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod geo;
pub mod grid;
pub mod job;
pub mod logging;
pub mod queue;
pub mod raster;
pub mod source;
pub mod storage;
pub mod worker;
pub mod writer;

/// Crate version, reported by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
