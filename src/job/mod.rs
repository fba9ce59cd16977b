//! Durable download job records.
//!
//! # Overview
//!
//! - [`DownloadJob`] - The durable record for one download
//! - [`JobStatus`] / [`JobSource`] - Lifecycle state and entry point
//! - [`JobPatch`] - Partial update applied through [`JobStore::update`]
//! - [`JobStore`] - Repository seam consumed by the orchestrator
//! - [`SqliteJobStore`] - `SQLite`-backed implementation
//!
//! # Example
//!
//! ```ignore
//! use bookfetch_core::job::{DownloadJob, JobSource, JobStore, SqliteJobStore};
//! use bookfetch_core::Database;
//!
//! let store = SqliteJobStore::new(Database::new_in_memory().await?);
//! store.create(&DownloadJob::new("d6e1…", "Dune", JobSource::Web, now_ms)).await?;
//! store.mark_started("d6e1…", now_ms).await?;
//! ```

mod error;
mod item;
mod repository;

pub use error::{StoreDbErrorKind, StoreError};
pub use item::{DownloadJob, JobPatch, JobSource, JobStatus, QueuedEntry, UploadStatus};
pub use repository::JobStore;

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::instrument;

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NotFound`].
fn check_affected(id: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(id.to_string()))
    } else {
        Ok(())
    }
}

// SQLite has no unsigned 64-bit column type.
fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn path_to_db(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Raw `jobs` row.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    title: String,
    source: String,
    status: String,
    retry_count: i64,
    delayed_retry_count: i64,
    next_retry_at: Option<i64>,
    downloaded_bytes: i64,
    total_bytes: Option<i64>,
    expected_size: Option<i64>,
    speed: Option<f64>,
    eta_seconds: Option<i64>,
    countdown_seconds: Option<i64>,
    countdown_started_at: Option<i64>,
    mirror_index: Option<i64>,
    temp_path: Option<String>,
    final_path: Option<String>,
    error: Option<String>,
    upload_status: Option<String>,
    queued_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<JobRow> for DownloadJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = row
            .status
            .parse()
            .map_err(|reason: String| StoreError::corrupt(&row.id, reason))?;
        let source = row
            .source
            .parse()
            .map_err(|reason: String| StoreError::corrupt(&row.id, reason))?;
        let upload_status = row
            .upload_status
            .as_deref()
            .map(str::parse::<UploadStatus>)
            .transpose()
            .map_err(|reason: String| StoreError::corrupt(&row.id, reason))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            source,
            status,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            delayed_retry_count: u32::try_from(row.delayed_retry_count).unwrap_or(0),
            next_retry_at: row.next_retry_at,
            downloaded_bytes: from_db(row.downloaded_bytes),
            total_bytes: row.total_bytes.map(from_db),
            expected_size: row.expected_size.map(from_db),
            speed: row.speed,
            eta_seconds: row.eta_seconds.map(from_db),
            countdown_seconds: row
                .countdown_seconds
                .and_then(|value| u32::try_from(value).ok()),
            countdown_started_at: row.countdown_started_at,
            mirror_index: row.mirror_index.and_then(|value| u32::try_from(value).ok()),
            temp_path: row.temp_path.map(PathBuf::from),
            final_path: row.final_path.map(PathBuf::from),
            error: row.error,
            upload_status,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn decode_rows(rows: Vec<JobRow>) -> Result<Vec<DownloadJob>> {
    rows.into_iter().map(DownloadJob::try_from).collect()
}

/// `SQLite`-backed job store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Counts jobs in a status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<DownloadJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(DownloadJob::try_from).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn create(&self, job: &DownloadJob) -> Result<()> {
        let result = sqlx::query(
            r"INSERT INTO jobs (
                id, title, source, status,
                retry_count, delayed_retry_count, next_retry_at,
                downloaded_bytes, total_bytes, expected_size, speed, eta_seconds,
                countdown_seconds, countdown_started_at, mirror_index,
                temp_path, final_path, error, upload_status,
                queued_at, started_at, completed_at
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.title)
        .bind(job.source.as_str())
        .bind(job.status.as_str())
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.delayed_retry_count))
        .bind(job.next_retry_at)
        .bind(to_db(job.downloaded_bytes))
        .bind(job.total_bytes.map(to_db))
        .bind(job.expected_size.map(to_db))
        .bind(job.speed)
        .bind(job.eta_seconds.map(to_db))
        .bind(job.countdown_seconds.map(i64::from))
        .bind(job.countdown_started_at)
        .bind(job.mirror_index.map(i64::from))
        .bind(job.temp_path.as_deref().map(path_to_db))
        .bind(job.final_path.as_deref().map(path_to_db))
        .bind(&job.error)
        .bind(job.upload_status.map(|s| s.as_str()))
        .bind(job.queued_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = StoreError::from(err);
                if err.database_kind() == Some(StoreDbErrorKind::Constraint) {
                    Err(StoreError::AlreadyExists(job.id.clone()))
                } else {
                    Err(err)
                }
            }
        }
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: &JobPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        // Only the columns present in the patch are written, so a progress
        // write never clobbers a concurrent status change.
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE jobs SET ");
        let mut fields = builder.separated(", ");

        if let Some(title) = &patch.title {
            fields.push("title = ").push_bind_unseparated(title.clone());
        }
        if let Some(status) = patch.status {
            fields.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(count) = patch.retry_count {
            fields
                .push("retry_count = ")
                .push_bind_unseparated(i64::from(count));
        }
        if let Some(count) = patch.delayed_retry_count {
            fields
                .push("delayed_retry_count = ")
                .push_bind_unseparated(i64::from(count));
        }
        if let Some(at) = patch.next_retry_at {
            fields.push("next_retry_at = ").push_bind_unseparated(at);
        }
        if let Some(bytes) = patch.downloaded_bytes {
            fields
                .push("downloaded_bytes = ")
                .push_bind_unseparated(to_db(bytes));
        }
        if let Some(total) = patch.total_bytes {
            fields
                .push("total_bytes = ")
                .push_bind_unseparated(total.map(to_db));
        }
        if let Some(expected) = patch.expected_size {
            fields
                .push("expected_size = ")
                .push_bind_unseparated(expected.map(to_db));
        }
        if let Some(speed) = patch.speed {
            fields.push("speed = ").push_bind_unseparated(speed);
        }
        if let Some(eta) = patch.eta_seconds {
            fields
                .push("eta_seconds = ")
                .push_bind_unseparated(eta.map(to_db));
        }
        if let Some(seconds) = patch.countdown_seconds {
            fields
                .push("countdown_seconds = ")
                .push_bind_unseparated(seconds.map(i64::from));
        }
        if let Some(at) = patch.countdown_started_at {
            fields.push("countdown_started_at = ").push_bind_unseparated(at);
        }
        if let Some(mirror) = patch.mirror_index {
            fields
                .push("mirror_index = ")
                .push_bind_unseparated(mirror.map(i64::from));
        }
        if let Some(path) = &patch.temp_path {
            fields
                .push("temp_path = ")
                .push_bind_unseparated(path.as_deref().map(path_to_db));
        }
        if let Some(path) = &patch.final_path {
            fields
                .push("final_path = ")
                .push_bind_unseparated(path.as_deref().map(path_to_db));
        }
        if let Some(error) = &patch.error {
            fields.push("error = ").push_bind_unseparated(error.clone());
        }
        if let Some(upload) = patch.upload_status {
            fields
                .push("upload_status = ")
                .push_bind_unseparated(upload.map(|s| s.as_str()));
        }
        if let Some(at) = patch.queued_at {
            fields.push("queued_at = ").push_bind_unseparated(at);
        }
        if let Some(at) = patch.started_at {
            fields.push("started_at = ").push_bind_unseparated(at);
        }
        if let Some(at) = patch.completed_at {
            fields.push("completed_at = ").push_bind_unseparated(at);
        }

        builder.push(" WHERE id = ").push_bind(id);
        let result = builder.build().execute(self.db.pool()).await?;

        check_affected(id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DownloadJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status = ? ORDER BY queued_at ASC, rowid ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.db.pool())
        .await?;
        decode_rows(rows)
    }

    #[instrument(skip(self))]
    async fn get_incomplete(&self) -> Result<Vec<DownloadJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r"SELECT * FROM jobs
              WHERE status IN (?, ?, ?)
              ORDER BY queued_at ASC, rowid ASC",
        )
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Downloading.as_str())
        .bind(JobStatus::Delayed.as_str())
        .fetch_all(self.db.pool())
        .await?;
        decode_rows(rows)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
