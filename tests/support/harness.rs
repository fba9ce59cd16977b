//! Wires an [`Orchestrator`] to fakes and a temporary directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use bookfetch_core::job::{DownloadJob, JobPatch, JobStatus, JobStore, SqliteJobStore};
use bookfetch_core::orchestrator::{Orchestrator, OrchestratorDeps, QueueSnapshot};
use bookfetch_core::ports::{
    Catalog, DisabledUploader, LocalFileOps, NullCatalog, Settings, StaticSettings, SystemClock,
    Uploader,
};
use bookfetch_core::{Database, JobSource};

use super::fakes::{ScriptedExecutor, Step};

pub async fn sqlite_store() -> Arc<SqliteJobStore> {
    let db = Database::new_in_memory().await.unwrap();
    Arc::new(SqliteJobStore::new(db))
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<ScriptedExecutor>,
    pub dir: TempDir,
    seeded: AtomicI64,
}

pub struct HarnessBuilder {
    store: Arc<dyn JobStore>,
    steps: Vec<Step>,
    uploader: Arc<dyn Uploader>,
    catalog: Arc<dyn Catalog>,
    configure: Box<dyn FnOnce(&mut Settings, &std::path::Path)>,
}

impl HarnessBuilder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            steps: Vec::new(),
            uploader: Arc::new(DisabledUploader),
            catalog: Arc::new(NullCatalog),
            configure: Box::new(|_, _| {}),
        }
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adjusts settings; the closure also gets the temporary root.
    pub fn settings(mut self, configure: impl FnOnce(&mut Settings, &std::path::Path) + 'static) -> Self {
        self.configure = Box::new(configure);
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings {
            download_dir: dir.path().join("incoming"),
            ..Settings::default()
        };
        (self.configure)(&mut settings, dir.path());

        let executor = Arc::new(ScriptedExecutor::new(self.steps));
        let orchestrator = Orchestrator::new(OrchestratorDeps {
            store: Arc::clone(&self.store),
            executor: executor.clone(),
            files: Arc::new(LocalFileOps::new(dir.path().join("library"))),
            uploader: self.uploader,
            catalog: self.catalog,
            settings: Arc::new(StaticSettings::new(settings)),
            clock: Arc::new(SystemClock::new()),
        });

        Harness {
            orchestrator,
            store: self.store,
            executor,
            dir,
            seeded: AtomicI64::new(1_700_000_000_000),
        }
    }
}

impl Harness {
    pub fn library_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub async fn job(&self, id: &str) -> DownloadJob {
        self.store
            .get(id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("job {id} should exist"))
    }

    /// Inserts a record directly, bypassing the queue. Later seeds sort after earlier ones.
    pub async fn seed(&self, id: &str, status: JobStatus, patch: JobPatch) -> DownloadJob {
        let queued_at = self.seeded.fetch_add(1, Ordering::SeqCst);
        let mut job = DownloadJob::new(id, id, JobSource::Api, queued_at);
        job.status = status;
        patch.apply(&mut job);
        self.store.create(&job).await.unwrap();
        job
    }

    /// Polls every `step` until `done` holds, for at most `limit`.
    pub async fn wait_until(
        &self,
        id: &str,
        step: Duration,
        limit: Duration,
        done: impl Fn(&DownloadJob) -> bool,
    ) -> DownloadJob {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(job) = self.store.get(id).await.unwrap()
                && done(&job)
            {
                return job;
            }
            assert!(waited < limit, "job {id} did not reach the expected state");
            tokio::time::sleep(step).await;
            waited += step;
        }
    }

    pub async fn wait_for_status(&self, id: &str, status: JobStatus) -> DownloadJob {
        self.wait_until(id, Duration::from_millis(10), Duration::from_secs(10), |job| {
            job.status == status
        })
        .await
    }
}

/// `next_retry_at` is set exactly when a job is `delayed`.
pub fn assert_retry_time_invariant(snapshot: &QueueSnapshot) {
    for status in JobStatus::ALL {
        for job in snapshot.jobs(status).values() {
            assert_eq!(
                job.next_retry_at.is_some(),
                job.status == JobStatus::Delayed,
                "retry time out of step with status for {job}"
            );
        }
    }
}
