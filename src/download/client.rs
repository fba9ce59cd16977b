//! HTTP client wrapper for streaming resolved downloads to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::{derive_filename, resolve_unique_path};
use super::progress::{ProgressControl, ProgressSink, ThroughputSampler};
use crate::user_agent;

/// A file written to disk by [`HttpClient::download_to_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// `Content-Length` the server announced, if any.
    pub content_length: Option<u64>,
}

/// HTTP client for downloading files with streaming support.
///
/// Created once and reused so connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts (30s connect, 5min idle read).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the client cannot be built.
    pub fn new() -> Result<Self, DownloadError> {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// `read_timeout_secs` bounds each read, not the whole transfer, so a
    /// slow but steady mirror can take as long as it needs.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the client cannot be built.
    pub fn new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| DownloadError::network("<client>", e))?;
        Ok(Self { client })
    }

    /// Streams `url` into `output_dir`, reporting throughput to `sink`.
    ///
    /// The filename comes from the URL, then `Content-Disposition`, then `id`.
    /// Bytes go to `<name>.part`, which is renamed once the body is complete
    /// and removed on any error or when the sink aborts.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - Writing to disk fails
    /// - The sink returns [`ProgressControl::Abort`] (`Cancelled`)
    #[instrument(skip(self, sink), fields(url = %url))]
    pub async fn download_to_dir(
        &self,
        url: &str,
        output_dir: &Path,
        id: &str,
        progress_interval: Duration,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let filename = derive_filename(&parsed_url, content_disposition.as_deref(), id);

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;
        let file_path = resolve_unique_path(output_dir, &filename);
        debug!(filename = %filename, path = %file_path.display(), "resolved output path");

        let content_length = response.content_length();
        let part_path = part_path(&file_path);
        let mut file = File::create(&part_path)
            .await
            .map_err(|e| DownloadError::io(part_path.clone(), e))?;

        let result = stream_to_file(
            &mut file,
            response,
            url,
            &part_path,
            content_length,
            progress_interval,
            sink,
        )
        .await;
        drop(file);

        let result = match result {
            Ok(bytes) => tokio::fs::rename(&part_path, &file_path)
                .await
                .map(|()| bytes)
                .map_err(|e| DownloadError::io(file_path.clone(), e)),
            Err(err) => Err(err),
        };
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %part_path.display(), error = %err, "cleaning up partial file");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(err);
            }
        };

        info!(path = %file_path.display(), bytes, "download complete");

        Ok(DownloadedFile {
            path: file_path,
            bytes,
            content_length,
        })
    }
}

/// `<path>.part`, where the body is written until it is complete.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    total: Option<u64>,
    progress_interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut sampler = ThroughputSampler::new(progress_interval, Instant::now());
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;

        if let Some(update) = sampler.sample(Instant::now(), bytes_written, total)
            && sink.report(update).await == ProgressControl::Abort
        {
            return Err(DownloadError::Cancelled);
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    let last = sampler.finish(Instant::now(), bytes_written, total);
    if sink.report(last).await == ProgressControl::Abort {
        return Err(DownloadError::Cancelled);
    }

    Ok(bytes_written)
}
