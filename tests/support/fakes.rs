//! In-process stand-ins for the orchestrator's collaborators.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use bookfetch_core::download::{
    DownloadError, DownloadedFile, ExecuteRequest, Executor, ProgressControl, ProgressSink,
    ProgressUpdate,
};
use bookfetch_core::job::{
    DownloadJob, JobPatch, JobStatus, JobStore, StoreDbErrorKind, StoreError,
};
use bookfetch_core::ports::{BookMetadata, Catalog, CatalogError, UploadError, Uploader};

/// One scripted executor outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Writes `bytes` to `output_dir/file_name` and succeeds.
    Succeed { file_name: String, bytes: Vec<u8> },
    /// Every mirror failed with a 503.
    Transient,
    /// The origin reported its daily limit.
    Quota,
    /// The job can never succeed as configured.
    Configuration,
    /// Keeps reporting progress until the sink says stop.
    UntilAborted,
    /// Parks before its first report until the gate is notified, then
    /// behaves like [`Step::UntilAborted`].
    Gated(Arc<Notify>),
}

impl Step {
    pub fn succeed(file_name: &str) -> Self {
        Self::Succeed {
            file_name: file_name.to_string(),
            bytes: b"%PDF-1.7 test payload".to_vec(),
        }
    }
}

/// Executor that plays back [`Step`]s in order; [`Step::Transient`] once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<ExecuteRequest>>,
}

impl ScriptedExecutor {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    /// Ids in the order they were executed.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.id.clone())
            .collect()
    }

    /// Every request, in execution order.
    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &ExecuteRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile, DownloadError> {
        self.calls.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Transient);

        match step {
            Step::Succeed { file_name, bytes } => {
                let len = bytes.len() as u64;
                let update = ProgressUpdate::Downloading {
                    downloaded: len,
                    total: Some(len),
                    percent: Some(100.0),
                    speed: 0.0,
                    eta_seconds: Some(0),
                };
                if sink.report(update).await == ProgressControl::Abort {
                    return Err(DownloadError::Cancelled);
                }
                std::fs::create_dir_all(&request.output_dir)
                    .map_err(|e| DownloadError::io(&request.output_dir, e))?;
                let path = request.output_dir.join(file_name);
                std::fs::write(&path, &bytes).map_err(|e| DownloadError::io(&path, e))?;
                Ok(DownloadedFile {
                    path,
                    bytes: len,
                    content_length: Some(len),
                })
            }
            Step::Transient => Err(DownloadError::all_mirrors_failed(
                &request.id,
                3,
                DownloadError::http_status("https://mirror.test/files/book.epub", 503),
            )),
            Step::Quota => Err(DownloadError::quota(
                format!("https://mirror.test/slow_download/{}/0/0", request.id),
                "daily download limit reached",
            )),
            Step::Configuration => Err(DownloadError::invalid_url("not a url")),
            Step::UntilAborted => report_until_aborted(sink).await,
            Step::Gated(gate) => {
                gate.notified().await;
                report_until_aborted(sink).await
            }
        }
    }
}

async fn report_until_aborted(sink: &dyn ProgressSink) -> Result<DownloadedFile, DownloadError> {
    loop {
        let update = ProgressUpdate::BypassingProtection { mirror: 0 };
        if sink.report(update).await == ProgressControl::Abort {
            return Err(DownloadError::Cancelled);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Job store kept in a `Vec`, ordered by insertion.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<DownloadJob>>,
    fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later [`JobStore::update`] fail.
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<DownloadJob>, StoreError> {
        Ok(self.jobs.lock().unwrap().iter().find(|job| job.id == id).cloned())
    }

    async fn create(&self, job: &DownloadJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|existing| existing.id == job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: &JobPatch) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database {
                kind: StoreDbErrorKind::Busy,
                message: "database is locked".to_string(),
            });
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(job);
        Ok(())
    }

    async fn get_by_status(&self, status: JobStatus) -> Result<Vec<DownloadJob>, StoreError> {
        let mut jobs: Vec<DownloadJob> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.queued_at);
        Ok(jobs)
    }

    async fn get_incomplete(&self) -> Result<Vec<DownloadJob>, StoreError> {
        let mut jobs: Vec<DownloadJob> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.status.is_active())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.queued_at);
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        Ok(jobs.len() != before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Succeed,
    Fail,
    NotAuthenticated,
}

/// Uploader that records every path it was handed.
#[derive(Debug)]
pub struct RecordingUploader {
    mode: UploadMode,
    uploads: Mutex<Vec<PathBuf>>,
}

impl RecordingUploader {
    pub fn new(mode: UploadMode) -> Self {
        Self {
            mode,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn upload_file(&self, path: &Path) -> Result<(), UploadError> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        match self.mode {
            UploadMode::Succeed => Ok(()),
            UploadMode::Fail => Err(UploadError::Transport("connection reset".to_string())),
            UploadMode::NotAuthenticated => Err(UploadError::NotAuthenticated),
        }
    }
}

/// Uploader that holds every upload until the gate is notified.
#[derive(Debug, Default)]
pub struct GatedUploader {
    pub gate: Notify,
    entered: AtomicBool,
}

impl GatedUploader {
    /// True once an upload is parked at the gate.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for GatedUploader {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn upload_file(&self, _path: &Path) -> Result<(), UploadError> {
        self.entered.store(true, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(())
    }
}

/// Catalog answering from a fixed map.
#[derive(Debug, Default)]
pub struct StubCatalog {
    entries: HashMap<String, BookMetadata>,
}

impl StubCatalog {
    pub fn with(mut self, id: &str, title: &str, size_bytes: Option<u64>) -> Self {
        self.entries.insert(
            id.to_string(),
            BookMetadata {
                title: title.to_string(),
                authors: vec!["Frank Herbert".to_string()],
                size_bytes,
            },
        );
        self
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn lookup(&self, id: &str) -> Result<Option<BookMetadata>, CatalogError> {
        Ok(self.entries.get(id).cloned())
    }
}
