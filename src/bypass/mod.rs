//! Bot-protection bypass through a remote headless-browser proxy.
//!
//! - [`BypassClient`] / [`FlareSolverrClient`] - session lifecycle and page fetches
//! - [`parser`] - pure extraction of download URLs, countdowns and quota notices

mod client;
pub mod parser;

use thiserror::Error;

pub use client::{
    BypassClient, BypassPage, DEFAULT_ENDPOINT, DEFAULT_MAX_TIMEOUT, FlareSolverrClient,
    new_session_name,
};
pub use parser::{
    DEFAULT_COUNTDOWN_BOUNDS, detect_quota_exhausted, extract_countdown_seconds,
    extract_download_url,
};

/// Errors talking to the bypass proxy.
#[derive(Debug, Error)]
pub enum BypassError {
    /// The HTTP client could not be constructed.
    #[error("failed to build bypass HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The proxy could not be reached.
    #[error("bypass proxy unreachable at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The proxy did not answer in time.
    #[error("bypass proxy at {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The proxy answered with a non-JSON error status.
    #[error("bypass proxy at {endpoint} returned HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// The proxy refused the command.
    #[error("bypass proxy refused {command}: {message}")]
    Rejected { command: String, message: String },

    /// The proxy's answer could not be understood.
    #[error("invalid bypass proxy response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl BypassError {
    pub fn unreachable(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn timeout(endpoint: impl Into<String>) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
        }
    }

    pub fn invalid_response(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}
