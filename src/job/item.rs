//! Download job record, status and patch types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the pending queue.
    Queued,
    /// Currently being transferred.
    Downloading,
    /// Waiting out a quota backoff until `next_retry_at`.
    Delayed,
    /// Downloaded and validated; artifact left at its temporary path.
    Done,
    /// Relocated into a library and/or uploaded to a remote library.
    Available,
    /// Failed; `error` holds the last failure message.
    Error,
    /// Cancelled by request.
    Cancelled,
}

impl JobStatus {
    /// All statuses, in snapshot order.
    pub const ALL: [Self; 7] = [
        Self::Available,
        Self::Queued,
        Self::Downloading,
        Self::Delayed,
        Self::Done,
        Self::Error,
        Self::Cancelled,
    ];

    /// Statuses that may be bulk-cleared.
    pub const SETTLED: [Self; 4] = [Self::Done, Self::Available, Self::Error, Self::Cancelled];

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Delayed => "delayed",
            Self::Done => "done",
            Self::Available => "available",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for statuses that hold a place in the pending queue.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Downloading | Self::Delayed)
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_active()
    }

    /// Returns true when an operator may re-queue the job.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "delayed" => Ok(Self::Delayed),
            "done" => Ok(Self::Done),
            "available" => Ok(Self::Available),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// How a job entered the queue. Picks the relocation target after download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    /// Requested from the web UI.
    Web,
    /// Requested through the indexer-compatible endpoint; files go to the indexer directory.
    Indexer,
    /// Requested through the HTTP API.
    Api,
}

impl JobSource {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Indexer => "indexer",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "indexer" => Ok(Self::Indexer),
            "api" => Ok(Self::Api),
            _ => Err(format!("invalid job source: {s}")),
        }
    }
}

/// Outcome of the remote-library upload step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Failed,
}

impl UploadStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid upload status: {s}")),
        }
    }
}

/// A durable download job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Content hash identifying the item upstream.
    pub id: String,
    pub title: String,
    pub source: JobSource,
    pub status: JobStatus,
    /// Immediate (transient-error) retries consumed.
    pub retry_count: u32,
    /// Quota retries consumed.
    pub delayed_retry_count: u32,
    /// Epoch ms of the next quota retry. Set only while `Delayed`.
    pub next_retry_at: Option<i64>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Size reported by the catalog at enqueue time.
    pub expected_size: Option<u64>,
    /// Bytes per second at the last sample.
    pub speed: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub countdown_seconds: Option<u32>,
    pub countdown_started_at: Option<i64>,
    /// Mirror the last attempt was working on; a resumed job starts there.
    pub mirror_index: Option<u32>,
    pub temp_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    /// Last failure message.
    pub error: Option<String>,
    pub upload_status: Option<UploadStatus>,
    pub queued_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl DownloadJob {
    /// Creates a freshly queued job.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: JobSource, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source,
            status: JobStatus::Queued,
            retry_count: 0,
            delayed_retry_count: 0,
            next_retry_at: None,
            downloaded_bytes: 0,
            total_bytes: None,
            expected_size: None,
            speed: None,
            eta_seconds: None,
            countdown_seconds: None,
            countdown_started_at: None,
            mirror_index: None,
            temp_path: None,
            final_path: None,
            error: None,
            upload_status: None,
            queued_at: now_ms,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns true if this job is delayed and its retry time has not arrived.
    #[must_use]
    pub fn is_waiting(&self, now_ms: i64) -> bool {
        self.status == JobStatus::Delayed && self.next_retry_at.is_some_and(|at| at > now_ms)
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadJob {{ id: {}, title: {}, status: {} }}",
            self.id, self.title, self.status
        )
    }
}

/// Partial update of a [`DownloadJob`].
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub title: Option<String>,
    pub status: Option<JobStatus>,
    pub retry_count: Option<u32>,
    pub delayed_retry_count: Option<u32>,
    pub next_retry_at: Option<Option<i64>>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<Option<u64>>,
    pub expected_size: Option<Option<u64>>,
    pub speed: Option<Option<f64>>,
    pub eta_seconds: Option<Option<u64>>,
    pub countdown_seconds: Option<Option<u32>>,
    pub countdown_started_at: Option<Option<i64>>,
    pub mirror_index: Option<Option<u32>>,
    pub temp_path: Option<Option<PathBuf>>,
    pub final_path: Option<Option<PathBuf>>,
    pub error: Option<Option<String>>,
    pub upload_status: Option<Option<UploadStatus>>,
    pub queued_at: Option<i64>,
    pub started_at: Option<Option<i64>>,
    pub completed_at: Option<Option<i64>>,
}

impl JobPatch {
    /// A status change. Clears `next_retry_at` and the countdown metrics, so
    /// only an explicit [`JobPatch::retry_at`] after it can leave a retry time set.
    #[must_use]
    pub fn transition(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            next_retry_at: Some(None),
            countdown_seconds: Some(None),
            countdown_started_at: Some(None),
            ..Self::default()
        }
    }

    /// Back to `Queued` with counters, error and transfer state wiped.
    #[must_use]
    pub fn reset_to_queued(now_ms: i64) -> Self {
        Self {
            retry_count: Some(0),
            delayed_retry_count: Some(0),
            error: Some(None),
            downloaded_bytes: Some(0),
            total_bytes: Some(None),
            speed: Some(None),
            eta_seconds: Some(None),
            upload_status: Some(None),
            mirror_index: Some(None),
            started_at: Some(None),
            completed_at: Some(None),
            queued_at: Some(now_ms),
            ..Self::transition(JobStatus::Queued)
        }
    }

    #[must_use]
    pub fn retry_at(mut self, at_ms: i64) -> Self {
        self.next_retry_at = Some(Some(at_ms));
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    #[must_use]
    pub fn completed_at(mut self, at_ms: i64) -> Self {
        self.completed_at = Some(Some(at_ms));
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch to an in-memory job.
    pub fn apply(&self, job: &mut DownloadJob) {
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    job.$field = value.clone();
                })*
            };
        }
        set!(
            title,
            status,
            retry_count,
            delayed_retry_count,
            next_retry_at,
            downloaded_bytes,
            total_bytes,
            expected_size,
            speed,
            eta_seconds,
            countdown_seconds,
            countdown_started_at,
            mirror_index,
            temp_path,
            final_path,
            error,
            upload_status,
            queued_at,
            started_at,
            completed_at,
        );
    }
}

/// Minimal pending-queue entry, rebuilt from the durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEntry {
    pub id: String,
    pub title: String,
    /// Mirror to start from when resuming; `None` starts at the first mirror.
    pub mirror_index: Option<u32>,
}

impl QueuedEntry {
    #[must_use]
    pub fn from_job(job: &DownloadJob) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            mirror_index: job.mirror_index,
        }
    }
}
