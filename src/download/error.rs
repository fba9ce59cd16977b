//! Error types for the download module.
//!
//! Every variant carries the context (url, path, mirror) needed for a useful
//! message. The orchestrator only looks at these through
//! [`classify_error`](super::classify_error).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::bypass::BypassError;

/// Errors that can occur while delivering an item.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The bypass proxy failed for this mirror.
    #[error("bypass failed for mirror {mirror}: {source}")]
    Bypass {
        mirror: u32,
        #[source]
        source: BypassError,
    },

    /// The interstitial page held no usable download link.
    #[error("no download link found on {url}")]
    NoDownloadLink { url: String },

    /// Resolving the mirror page took longer than the attempt ceiling.
    #[error("mirror {mirror} attempt timed out after {}s", .after.as_secs())]
    AttemptTimeout { mirror: u32, after: Duration },

    /// The origin is rate-limiting globally (daily quota reached).
    #[error("download quota exhausted at {url}: {reason}")]
    Quota { url: String, reason: String },

    /// Every mirror failed; holds the last mirror's error.
    #[error("all {attempts} mirrors failed for {id}; last error: {last}")]
    AllMirrorsFailed {
        id: String,
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },

    /// The progress sink asked to stop.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error, separating timeouts from other network failures.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn bypass(mirror: u32, source: BypassError) -> Self {
        Self::Bypass { mirror, source }
    }

    pub fn no_download_link(url: impl Into<String>) -> Self {
        Self::NoDownloadLink { url: url.into() }
    }

    pub fn quota(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Quota {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn all_mirrors_failed(id: impl Into<String>, attempts: u32, last: DownloadError) -> Self {
        Self::AllMirrorsFailed {
            id: id.into(),
            attempts,
            last: Box::new(last),
        }
    }

    /// Returns true for the origin-wide quota condition.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.epub");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.epub"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let msg = DownloadError::http_status("https://example.com/file.epub", 404).to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/file.epub"));
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let msg = DownloadError::io(PathBuf::from("/tmp/test.epub"), io_error).to_string();
        assert!(msg.contains("/tmp/test.epub"), "Expected path in: {msg}");
    }

    #[test]
    fn test_all_mirrors_failed_names_last_error() {
        let last = DownloadError::no_download_link("https://mirror/slow_download/abc/0/2");
        let msg = DownloadError::all_mirrors_failed("abc", 3, last).to_string();
        assert!(msg.contains("all 3 mirrors failed for abc"), "{msg}");
        assert!(msg.contains("no download link"), "{msg}");
    }

    #[test]
    fn test_attempt_timeout_display_in_seconds() {
        let msg = DownloadError::AttemptTimeout {
            mirror: 1,
            after: Duration::from_secs(300),
        }
        .to_string();
        assert_eq!(msg, "mirror 1 attempt timed out after 300s");
    }

    #[test]
    fn test_is_quota() {
        assert!(DownloadError::quota("u", "daily limit").is_quota());
        assert!(!DownloadError::Cancelled.is_quota());
    }
}
