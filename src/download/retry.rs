//! Failure classification for download outcomes.
//!
//! The executor only classifies and reports; the orchestrator owns every
//! retry decision. [`classify_error`] is the single point where a
//! [`DownloadError`] is mapped onto the retry budget it draws from.
//!
//! # Example
//!
//! ```
//! use bookfetch_core::download::{DownloadError, FailureType, classify_error};
//!
//! let error = DownloadError::http_status("https://example.com/book.epub", 503);
//! assert_eq!(classify_error(&error), FailureType::Transient);
//! ```

use tracing::instrument;

use crate::bypass::BypassError;

use super::DownloadError;

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on an immediate retry. Draws from the retry budget.
    ///
    /// Examples: network timeout, 5xx, missing link, every mirror failing.
    Transient,

    /// The origin is rate-limiting globally. Draws from the quota budget
    /// and waits out an hourly backoff.
    Quota,

    /// Local misconfiguration; retrying cannot help. Settles immediately
    /// without consuming either budget.
    Configuration,

    /// Not a failure: the job was cancelled.
    Cancelled,
}

/// Classifies a download error into a failure type.
///
/// | Error | Type |
/// |-------|------|
/// | `Quota`, HTTP 429 | Quota |
/// | `Cancelled` | Cancelled |
/// | `InvalidUrl`, bypass client build failure | Configuration |
/// | `AllMirrorsFailed` | type of the last mirror's error |
/// | everything else | Transient |
#[instrument(level = "debug")]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Quota { .. } | DownloadError::HttpStatus { status: 429, .. } => {
            FailureType::Quota
        }

        DownloadError::Cancelled => FailureType::Cancelled,

        DownloadError::InvalidUrl { .. }
        | DownloadError::Bypass {
            source: BypassError::Client(_),
            ..
        } => FailureType::Configuration,

        DownloadError::AllMirrorsFailed { last, .. } => match classify_error(last) {
            // A single mirror's bad link is not a configuration problem for the job.
            FailureType::Configuration => FailureType::Transient,
            other => other,
        },

        DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::HttpStatus { .. }
        | DownloadError::Io { .. }
        | DownloadError::Bypass { .. }
        | DownloadError::NoDownloadLink { .. }
        | DownloadError::AttemptTimeout { .. } => FailureType::Transient,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_quota_errors() {
        assert_eq!(
            classify_error(&DownloadError::quota("u", "daily limit")),
            FailureType::Quota
        );
        assert_eq!(
            classify_error(&DownloadError::http_status("u", 429)),
            FailureType::Quota
        );
    }

    #[test]
    fn test_transient_errors() {
        for error in [
            DownloadError::http_status("u", 503),
            DownloadError::http_status("u", 404),
            DownloadError::timeout("u"),
            DownloadError::no_download_link("u"),
            DownloadError::AttemptTimeout {
                mirror: 0,
                after: Duration::from_secs(300),
            },
            DownloadError::bypass(1, BypassError::timeout("http://proxy")),
        ] {
            assert_eq!(classify_error(&error), FailureType::Transient, "{error}");
        }
    }

    #[test]
    fn test_configuration_and_cancelled() {
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Configuration
        );
        assert_eq!(
            classify_error(&DownloadError::Cancelled),
            FailureType::Cancelled
        );
    }

    #[test]
    fn test_all_mirrors_failed_follows_last_error() {
        let transient = DownloadError::all_mirrors_failed("id", 3, DownloadError::timeout("u"));
        assert_eq!(classify_error(&transient), FailureType::Transient);

        let invalid = DownloadError::all_mirrors_failed("id", 3, DownloadError::invalid_url("x"));
        assert_eq!(classify_error(&invalid), FailureType::Transient);
    }
}
