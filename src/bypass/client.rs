//! FlareSolverr-compatible bypass session client.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::user_agent;

use super::BypassError;

/// Where a local FlareSolverr listens by default.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8191";

/// Default per-request ceiling the proxy is asked to honour.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra client-side slack on top of `maxTimeout` before we give up on the proxy.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A page fetched through a bypass session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassPage {
    /// Final URL after any redirects the browser followed.
    pub url: String,
    /// HTTP status the origin answered with.
    pub status: u16,
    pub html: String,
}

/// Remote headless-browser proxy.
///
/// Session names are chosen by the caller so a session can be torn down even
/// when its creation call timed out.
#[async_trait]
pub trait BypassClient: Send + Sync {
    async fn create_session(&self, session: &str) -> Result<(), BypassError>;

    async fn fetch(&self, session: &str, url: &str) -> Result<BypassPage, BypassError>;

    async fn destroy_session(&self, session: &str) -> Result<(), BypassError>;
}

/// Generates a fresh session name.
#[must_use]
pub fn new_session_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("bookfetch-{}", suffix.to_ascii_lowercase())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyCommand<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<ProxySolution>,
}

#[derive(Debug, Deserialize)]
struct ProxySolution {
    url: String,
    status: u16,
    #[serde(default)]
    response: String,
}

/// Client for a FlareSolverr-compatible proxy (`POST {endpoint}/v1`).
#[derive(Debug, Clone)]
pub struct FlareSolverrClient {
    client: Client,
    endpoint: String,
    max_timeout: Duration,
}

impl FlareSolverrClient {
    /// Creates a client for the proxy at `endpoint` (e.g. `http://localhost:8191`).
    ///
    /// # Errors
    ///
    /// Returns [`BypassError::Client`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, BypassError> {
        Self::with_max_timeout(endpoint, DEFAULT_MAX_TIMEOUT)
    }

    /// Creates a client with a custom `maxTimeout` passed to the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`BypassError::Client`] if the HTTP client cannot be built.
    pub fn with_max_timeout(
        endpoint: impl Into<String>,
        max_timeout: Duration,
    ) -> Result<Self, BypassError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(max_timeout + CLIENT_TIMEOUT_SLACK)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(BypassError::Client)?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint,
            max_timeout,
        })
    }

    /// The proxy endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn command(&self, command: &ProxyCommand<'_>) -> Result<ProxyResponse, BypassError> {
        let url = format!("{}/v1", self.endpoint);
        debug!(cmd = command.cmd, session = ?command.session, "bypass proxy command");

        let response = self
            .client
            .post(&url)
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BypassError::timeout(&self.endpoint)
                } else {
                    BypassError::unreachable(&self.endpoint, e)
                }
            })?;

        let http_status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BypassError::timeout(&self.endpoint)
            } else {
                BypassError::unreachable(&self.endpoint, e)
            }
        })?;

        // The proxy reports command failures as JSON on a 500, so try the body first.
        let parsed = match serde_json::from_str::<ProxyResponse>(&body) {
            Ok(parsed) => parsed,
            Err(e) if http_status.is_success() => {
                return Err(BypassError::invalid_response(
                    &self.endpoint,
                    format!("malformed JSON: {e}"),
                ));
            }
            Err(_) => {
                return Err(BypassError::HttpStatus {
                    endpoint: self.endpoint.clone(),
                    status: http_status.as_u16(),
                });
            }
        };

        if !parsed.status.eq_ignore_ascii_case("ok") {
            return Err(BypassError::Rejected {
                command: command.cmd.to_string(),
                message: parsed.message,
            });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl BypassClient for FlareSolverrClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn create_session(&self, session: &str) -> Result<(), BypassError> {
        self.command(&ProxyCommand {
            cmd: "sessions.create",
            session: Some(session),
            url: None,
            max_timeout: None,
        })
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self, session: &str, url: &str) -> Result<BypassPage, BypassError> {
        let max_timeout = u64::try_from(self.max_timeout.as_millis()).unwrap_or(u64::MAX);
        let response = self
            .command(&ProxyCommand {
                cmd: "request.get",
                session: Some(session),
                url: Some(url),
                max_timeout: Some(max_timeout),
            })
            .await?;

        let Some(solution) = response.solution else {
            warn!(%url, "bypass proxy answered ok without a solution");
            return Err(BypassError::invalid_response(
                &self.endpoint,
                "response has no solution",
            ));
        };
        debug!(status = solution.status, final_url = %solution.url, "page fetched through bypass");

        Ok(BypassPage {
            url: solution.url,
            status: solution.status,
            html: solution.response,
        })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn destroy_session(&self, session: &str) -> Result<(), BypassError> {
        self.command(&ProxyCommand {
            cmd: "sessions.destroy",
            session: Some(session),
            url: None,
            max_timeout: None,
        })
        .await?;
        Ok(())
    }
}
