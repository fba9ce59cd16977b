//! Repository seam for durable job records.
//!
//! The orchestrator depends only on this trait; [`SqliteJobStore`] is the
//! provided implementation.
//!
//! [`SqliteJobStore`]: super::SqliteJobStore

use std::path::Path;

use async_trait::async_trait;

use super::{DownloadJob, JobPatch, JobStatus, Result, UploadStatus};

/// Data-access contract for download jobs.
///
/// The `mark_*` helpers are built on [`JobStore::update`] so every status
/// change goes through [`JobPatch::transition`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetches a job by id.
    async fn get(&self, id: &str) -> Result<Option<DownloadJob>>;

    /// Inserts a new job. Fails with `AlreadyExists` on a duplicate id.
    async fn create(&self, job: &DownloadJob) -> Result<()>;

    /// Applies a partial update. Fails with `NotFound` for an unknown id.
    async fn update(&self, id: &str, patch: &JobPatch) -> Result<()>;

    /// Lists jobs in a status, oldest first.
    async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DownloadJob>>;

    /// Lists queued, downloading and delayed jobs, oldest first.
    async fn get_incomplete(&self) -> Result<Vec<DownloadJob>>;

    /// Deletes a job. Returns false if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn mark_started(&self, id: &str, now_ms: i64) -> Result<()> {
        let patch = JobPatch {
            started_at: Some(Some(now_ms)),
            completed_at: Some(None),
            ..JobPatch::transition(JobStatus::Downloading)
        };
        self.update(id, &patch).await
    }

    async fn mark_completed(&self, id: &str, temp_path: &Path, now_ms: i64) -> Result<()> {
        let patch = JobPatch {
            temp_path: Some(Some(temp_path.to_path_buf())),
            error: Some(None),
            ..JobPatch::transition(JobStatus::Done).completed_at(now_ms)
        };
        self.update(id, &patch).await
    }

    async fn mark_error(&self, id: &str, message: &str, now_ms: i64) -> Result<()> {
        let patch = JobPatch::transition(JobStatus::Error)
            .error(message)
            .completed_at(now_ms);
        self.update(id, &patch).await
    }

    async fn mark_cancelled(&self, id: &str, now_ms: i64) -> Result<()> {
        let patch = JobPatch::transition(JobStatus::Cancelled).completed_at(now_ms);
        self.update(id, &patch).await
    }

    async fn mark_available(
        &self,
        id: &str,
        final_path: Option<&Path>,
        upload: Option<(UploadStatus, Option<String>)>,
        now_ms: i64,
    ) -> Result<()> {
        let mut patch = JobPatch {
            final_path: Some(final_path.map(Path::to_path_buf)),
            error: Some(None),
            ..JobPatch::transition(JobStatus::Available).completed_at(now_ms)
        };
        if let Some((status, message)) = upload {
            patch.upload_status = Some(Some(status));
            patch.error = Some(message);
        }
        self.update(id, &patch).await
    }

    async fn set_countdown(&self, id: &str, seconds: u32, now_ms: i64) -> Result<()> {
        let patch = JobPatch {
            countdown_seconds: Some(Some(seconds)),
            countdown_started_at: Some(Some(now_ms)),
            ..JobPatch::default()
        };
        self.update(id, &patch).await
    }

    async fn clear_countdown(&self, id: &str) -> Result<()> {
        let patch = JobPatch {
            countdown_seconds: Some(None),
            countdown_started_at: Some(None),
            ..JobPatch::default()
        };
        self.update(id, &patch).await
    }

    async fn update_progress(
        &self,
        id: &str,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed: Option<f64>,
        eta_seconds: Option<u64>,
    ) -> Result<()> {
        let patch = JobPatch {
            downloaded_bytes: Some(downloaded_bytes),
            total_bytes: Some(total_bytes),
            speed: Some(speed),
            eta_seconds: Some(eta_seconds),
            ..JobPatch::default()
        };
        self.update(id, &patch).await
    }
}
