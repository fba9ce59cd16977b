//! Mirror-by-mirror delivery of a single item.
//!
//! For each mirror, in order: open a bypass session, fetch the slow-download
//! page, pull out the direct link (waiting out a countdown if the page asks
//! for one), close the session, then stream the file. Resolution is bounded
//! by `attempt_timeout`; the transfer itself by the HTTP client's timeouts.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::bypass::{
    BypassClient, BypassPage, detect_quota_exhausted, extract_countdown_seconds,
    extract_download_url, new_session_name,
};

use super::client::{DownloadedFile, HttpClient};
use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_COUNTDOWN_BUFFER,
    DEFAULT_MIRROR_BASE_URL, DEFAULT_MIRROR_COUNT, DEFAULT_PROGRESS_INTERVAL, READ_TIMEOUT_SECS,
};
use super::error::DownloadError;
use super::progress::{ProgressControl, ProgressSink, ProgressUpdate};
use super::retry::{FailureType, classify_error};

/// Executor tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Origin serving `/slow_download/{id}/0/{mirror}` pages.
    pub mirror_base_url: String,
    pub mirror_count: u32,
    /// Ceiling on session + page fetch + countdown + re-fetch for one mirror.
    pub attempt_timeout: Duration,
    pub countdown_min_secs: u32,
    pub countdown_max_secs: u32,
    pub countdown_buffer: Duration,
    pub progress_interval: Duration,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mirror_base_url: DEFAULT_MIRROR_BASE_URL.to_string(),
            mirror_count: DEFAULT_MIRROR_COUNT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            countdown_min_secs: 1,
            countdown_max_secs: 300,
            countdown_buffer: DEFAULT_COUNTDOWN_BUFFER,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl ExecutorConfig {
    /// Slow-download page for `id` on `mirror`.
    #[must_use]
    pub fn mirror_url(&self, id: &str, mirror: u32) -> String {
        format!(
            "{}/slow_download/{}/0/{mirror}",
            self.mirror_base_url.trim_end_matches('/'),
            urlencoding::encode(id)
        )
    }

    #[must_use]
    pub fn countdown_bounds(&self) -> RangeInclusive<u32> {
        self.countdown_min_secs..=self.countdown_max_secs
    }
}

/// One delivery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub id: String,
    /// Directory the file is streamed into.
    pub output_dir: PathBuf,
    /// First mirror to try; `None` starts at mirror 0.
    pub start_mirror: Option<u32>,
}

impl ExecuteRequest {
    #[must_use]
    pub fn new(id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            output_dir: output_dir.into(),
            start_mirror: None,
        }
    }
}

/// Delivers an item to disk. The orchestrator depends only on this trait.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Tries mirrors in order and returns the first success.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Quota`] as soon as any mirror reports the
    /// origin quota, [`DownloadError::Cancelled`] if the sink aborts, and
    /// [`DownloadError::AllMirrorsFailed`] when every mirror failed otherwise.
    async fn execute(
        &self,
        request: &ExecuteRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile, DownloadError>;
}

/// The production executor.
pub struct DownloadExecutor {
    bypass: Arc<dyn BypassClient>,
    http: HttpClient,
    config: ExecutorConfig,
}

impl std::fmt::Debug for DownloadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DownloadExecutor {
    /// Creates an executor over a bypass client.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the HTTP client cannot be built.
    pub fn new(bypass: Arc<dyn BypassClient>, config: ExecutorConfig) -> Result<Self, DownloadError> {
        let http = HttpClient::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)?;
        Ok(Self {
            bypass,
            http,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    #[instrument(skip(self, output_dir, sink), fields(job_id = %id))]
    async fn attempt_mirror(
        &self,
        id: &str,
        mirror: u32,
        output_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile, DownloadError> {
        report(sink, ProgressUpdate::BypassingProtection { mirror }).await?;

        let page_url = self.config.mirror_url(id, mirror);
        let session = new_session_name();
        let resolved = tokio::time::timeout(
            self.config.attempt_timeout,
            self.resolve_link(&session, mirror, &page_url, sink),
        )
        .await;

        // Runs on every outcome, including the timeout above.
        if let Err(e) = self.bypass.destroy_session(&session).await {
            warn!(%session, error = %e, "failed to close bypass session");
        }

        let download_url = match resolved {
            Ok(result) => result?,
            Err(_) => {
                return Err(DownloadError::AttemptTimeout {
                    mirror,
                    after: self.config.attempt_timeout,
                });
            }
        };
        info!(mirror, url = %download_url, "download link resolved");

        self.http
            .download_to_dir(
                &download_url,
                output_dir,
                id,
                self.config.progress_interval,
                sink,
            )
            .await
    }

    async fn resolve_link(
        &self,
        session: &str,
        mirror: u32,
        page_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String, DownloadError> {
        self.bypass
            .create_session(session)
            .await
            .map_err(|e| DownloadError::bypass(mirror, e))?;

        let page = self.fetch_page(session, mirror, page_url).await?;
        if let Some(url) = extract_download_url(&page.html) {
            return Ok(url);
        }

        let Some(seconds) = extract_countdown_seconds(&page.html, &self.config.countdown_bounds())
        else {
            return Err(missing_link(page_url, &page));
        };

        debug!(mirror, seconds, "waiting out mirror countdown");
        report(sink, ProgressUpdate::WaitingCountdown { seconds }).await?;
        tokio::time::sleep(Duration::from_secs(u64::from(seconds)) + self.config.countdown_buffer)
            .await;

        let page = self.fetch_page(session, mirror, page_url).await?;
        extract_download_url(&page.html).ok_or_else(|| missing_link(page_url, &page))
    }

    async fn fetch_page(
        &self,
        session: &str,
        mirror: u32,
        page_url: &str,
    ) -> Result<BypassPage, DownloadError> {
        let page = self
            .bypass
            .fetch(session, page_url)
            .await
            .map_err(|e| DownloadError::bypass(mirror, e))?;

        if page.status == 429 {
            return Err(DownloadError::quota(page_url, "HTTP 429 from origin"));
        }
        if detect_quota_exhausted(&page.html) {
            return Err(DownloadError::quota(page_url, "daily download limit reached"));
        }
        Ok(page)
    }
}

fn missing_link(page_url: &str, page: &BypassPage) -> DownloadError {
    if page.status >= 400 {
        DownloadError::http_status(page_url, page.status)
    } else {
        DownloadError::no_download_link(page_url)
    }
}

async fn report(sink: &dyn ProgressSink, update: ProgressUpdate) -> Result<(), DownloadError> {
    match sink.report(update).await {
        ProgressControl::Continue => Ok(()),
        ProgressControl::Abort => Err(DownloadError::Cancelled),
    }
}

#[async_trait]
impl Executor for DownloadExecutor {
    #[instrument(skip(self, request, sink), fields(job_id = %request.id))]
    async fn execute(
        &self,
        request: &ExecuteRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile, DownloadError> {
        let count = self.config.mirror_count.max(1);
        let start = request.start_mirror.unwrap_or(0).min(count - 1);
        let mut last_error = None;
        let mut attempts = 0;

        for mirror in start..count {
            attempts += 1;
            match self
                .attempt_mirror(&request.id, mirror, &request.output_dir, sink)
                .await
            {
                Ok(file) => return Ok(file),
                Err(e) => match classify_error(&e) {
                    // Quota is origin-wide and config errors repeat on every mirror.
                    FailureType::Quota | FailureType::Cancelled | FailureType::Configuration => {
                        return Err(e);
                    }
                    FailureType::Transient => {
                        warn!(mirror, error = %e, "mirror attempt failed");
                        last_error = Some(e);
                    }
                },
            }
        }

        let last = last_error.unwrap_or_else(|| DownloadError::no_download_link(&request.id));
        Err(DownloadError::all_mirrors_failed(&request.id, attempts, last))
    }
}
