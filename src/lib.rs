//! Bookfetch Core Library
//!
//! Queues book downloads, resolves them through a bot-protection bypass
//! proxy mirror by mirror, and files the results.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`orchestrator`] - single-consumer job queue, retry policy and post-download pipeline
//! - [`download`] - mirror-by-mirror executor and streaming HTTP client
//! - [`bypass`] - bypass proxy client and interstitial page parser
//! - [`job`] - durable job records and the SQLite job store
//! - [`db`] - database connection and schema management
//! - [`ports`] - settings, filesystem, upload, catalog and clock seams
//! - [`limiter`] - fail-fast concurrency limiter for auxiliary resources

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bypass;
pub mod db;
pub mod download;
pub mod job;
pub mod limiter;
pub mod orchestrator;
pub mod ports;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use db::Database;
pub use download::{
    DownloadError, DownloadExecutor, ExecuteRequest, Executor, ExecutorConfig, FailureType,
    classify_error,
};
pub use job::{DownloadJob, JobSource, JobStatus, JobStore, SqliteJobStore};
pub use limiter::BoundedLimiter;
pub use orchestrator::{EnqueueResult, Orchestrator, OrchestratorDeps, OrchestratorError, QueueSnapshot};
