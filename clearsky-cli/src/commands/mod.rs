//! CLI command implementations.
//!
//! - [`dispatch`] - partition an extent and publish one job per tile
//! - [`serve`] - run the worker behind an HTTP push endpoint
//! - [`compose`] - run a single job locally

pub mod common;
pub mod compose;
pub mod dispatch;
pub mod serve;
