//! Download execution: mirror resolution, streaming, and failure classification.
//!
//! # Features
//!
//! - Sequential mirror fallback through a bypass proxy
//! - Countdown interstitials waited out on a timer
//! - Streaming downloads with sampled throughput and ETA
//! - Cooperative cancellation through the progress sink
//! - Filenames derived from the URL, `Content-Disposition`, or the item id
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookfetch_core::bypass::FlareSolverrClient;
//! use bookfetch_core::download::{
//!     DownloadExecutor, ExecuteRequest, Executor, ExecutorConfig, NoopProgress,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bypass = Arc::new(FlareSolverrClient::new("http://localhost:8191")?);
//! let executor = DownloadExecutor::new(bypass, ExecutorConfig::default())?;
//! let file = executor
//!     .execute(&ExecuteRequest::new("d6e1f0", "./downloads"), &NoopProgress)
//!     .await?;
//! println!("Downloaded: {}", file.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod executor;
pub mod filename;
mod progress;
mod retry;

pub use client::{DownloadedFile, HttpClient};
pub use error::DownloadError;
pub use executor::{DownloadExecutor, ExecuteRequest, Executor, ExecutorConfig};
pub use progress::{NoopProgress, ProgressControl, ProgressSink, ProgressUpdate, ThroughputSampler};
pub use retry::{FailureType, classify_error};
