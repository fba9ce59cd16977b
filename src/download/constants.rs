//! Constants for the download module (timeouts, mirrors, sampling).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout: the longest gap between body chunks (5 minutes).
/// The transfer as a whole has no deadline.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default origin for mirror pages.
pub const DEFAULT_MIRROR_BASE_URL: &str = "https://annas-archive.org";

/// Default number of slow-download mirrors tried per attempt.
pub const DEFAULT_MIRROR_COUNT: u32 = 3;

/// Ceiling on resolving one mirror (session, page fetch, countdown, re-fetch).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Added to a parsed countdown before re-fetching the page.
pub const DEFAULT_COUNTDOWN_BUFFER: Duration = Duration::from_secs(2);

/// Cadence for throughput/ETA samples while streaming.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
