//! Single-consumer download queue.
//!
//! The [`Orchestrator`] owns the in-memory FIFO of pending jobs and the
//! "current job" marker. One background task pops entries and runs them
//! through the [`Executor`], applies the retry policy on failure and the
//! post-download pipeline on success. Every durable change goes through the
//! [`JobStore`]; the queue itself is rebuilt from the store by
//! [`Orchestrator::start`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bookfetch_core::orchestrator::{Orchestrator, OrchestratorDeps};
//! # use bookfetch_core::job::JobSource;
//! # async fn example(deps: OrchestratorDeps) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(deps);
//! orchestrator.start().await?;
//! orchestrator.enqueue("md5:0123abcd", JobSource::Api).await?;
//! orchestrator.wait_idle().await;
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod notify;
mod pipeline;
mod progress;
pub mod retry;
mod snapshot;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::download::{DownloadError, ExecuteRequest, Executor, FailureType, classify_error};
use crate::job::{DownloadJob, JobPatch, JobSource, JobStatus, JobStore, QueuedEntry, StoreError};
use crate::ports::{Catalog, Clock, FileOps, SettingsProvider, Uploader};

pub use error::OrchestratorError;
pub use notify::SubscriptionId;
pub use snapshot::QueueSnapshot;

use notify::Notifier;
use pipeline::PipelineOutcome;
use progress::JobProgress;
use retry::RetryDecision;

/// How long [`Orchestrator::shutdown`] waits for the running job to stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<dyn Executor>,
    pub files: Arc<dyn FileOps>,
    pub uploader: Arc<dyn Uploader>,
    pub catalog: Arc<dyn Catalog>,
    pub settings: Arc<dyn SettingsProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Result of [`Orchestrator::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueResult {
    /// Newly queued, or re-queued from a settled state.
    Queued { position: usize },
    /// Already `available`; nothing was queued.
    AlreadyDownloaded { job: Box<DownloadJob> },
    /// Already pending; no duplicate was created.
    AlreadyInQueue { position: usize },
}

impl EnqueueResult {
    /// 1-based queue position, if the job is pending.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Queued { position } | Self::AlreadyInQueue { position } => Some(*position),
            Self::AlreadyDownloaded { .. } => None,
        }
    }
}

/// Result of [`Orchestrator::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    pub status: JobStatus,
    pub position: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedEntry>,
    current: Option<String>,
    cancel_current: bool,
    /// The current transfer finished; the pipeline is filing the result.
    finishing: bool,
    running: bool,
    stopped: bool,
    worker: Option<JoinHandle<()>>,
}

impl QueueState {
    /// 1-based position; the current job is position 1 unless it was cancelled.
    fn position(&self, id: &str) -> Option<usize> {
        if self.current.as_deref() == Some(id) && !self.cancel_current {
            return Some(1);
        }
        let offset = usize::from(self.current.is_some());
        self.pending
            .iter()
            .position(|entry| entry.id == id)
            .map(|index| index + 1 + offset)
    }

    /// Appends unless the id is already pending or current. A cancelled
    /// current job is queued again behind the attempt being torn down.
    fn push(&mut self, entry: QueuedEntry) -> usize {
        if let Some(position) = self.position(&entry.id) {
            return position;
        }
        self.pending.push_back(entry);
        self.pending.len() + usize::from(self.current.is_some())
    }

    fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|entry| entry.id == id)
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|entry| entry.id != id);
        self.pending.len() != before
    }

    fn is_idle(&self) -> bool {
        !self.running && self.current.is_none() && self.pending.is_empty()
    }
}

/// Outcome of one pass over a queue entry.
enum Step {
    Ran,
    Deferred,
    Skipped,
}

struct Inner {
    deps: OrchestratorDeps,
    state: Mutex<QueueState>,
    notifier: Notifier,
    /// Cuts a quiescent sleep short when work arrives or on shutdown.
    wake: Notify,
    /// Signalled when the loop exits.
    idle: Notify,
}

/// The download queue.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Orchestrator")
            .field("pending", &state.pending.len())
            .field("current", &state.current)
            .field("running", &state.running)
            .field("notifier", &self.inner.notifier)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                state: Mutex::new(QueueState::default()),
                notifier: Notifier::default(),
                wake: Notify::new(),
                idle: Notify::new(),
            }),
        }
    }

    /// Rebuilds the queue from every incomplete job and starts the loop.
    ///
    /// Jobs left `downloading` by a previous process go back to `queued`;
    /// `delayed` jobs keep their retry time. Returns the number of jobs queued.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] if incomplete jobs cannot be listed,
    /// or [`OrchestratorError::Stopped`] after [`Orchestrator::shutdown`].
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<usize> {
        self.inner.ensure_not_stopped()?;

        let jobs = self.inner.deps.store.get_incomplete().await?;
        let mut resumed = 0;
        for job in jobs {
            if job.status == JobStatus::Downloading {
                debug!(job_id = %job.id, "resetting interrupted download");
                if let Err(e) = self
                    .inner
                    .deps
                    .store
                    .update(&job.id, &JobPatch::transition(JobStatus::Queued))
                    .await
                {
                    warn!(job_id = %job.id, error = %e, "failed to reset interrupted download");
                }
            }
            self.inner.state().push(QueuedEntry::from_job(&job));
            resumed += 1;
        }

        if resumed > 0 {
            info!(resumed, "resumed incomplete jobs");
        }
        self.inner.publish().await;
        self.inner.ensure_running();
        Ok(resumed)
    }

    /// Stops the loop and drops the in-memory queue.
    ///
    /// The running job is asked to abort and goes back to `queued` so the
    /// next [`Orchestrator::start`] resumes it. If it does not stop within a
    /// grace period the worker task is aborted.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.inner.state();
            state.stopped = true;
            state.worker.take()
        };
        self.inner.wake.notify_one();

        if let Some(mut handle) = worker {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "queue worker panicked"),
                Err(_) => {
                    warn!("queue worker did not stop in time; aborting");
                    handle.abort();
                    if let Err(e) = handle.await
                        && !e.is_cancelled()
                    {
                        warn!(error = %e, "queue worker panicked");
                    }
                }
            }
        }

        {
            let mut state = self.inner.state();
            state.pending.clear();
            state.current = None;
            state.running = false;
        }
        self.inner.idle.notify_waiters();
        info!("orchestrator stopped");
        self.inner.publish().await;
    }

    /// Queues `id` for download.
    ///
    /// An `available` job is reported as already downloaded. A pending job
    /// keeps its place. Any other existing record is reset and re-queued.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidId`] for a blank id,
    /// [`OrchestratorError::Stopped`] after shutdown, and
    /// [`OrchestratorError::Store`] if the record cannot be read or written.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn enqueue(&self, id: &str, source: JobSource) -> Result<EnqueueResult> {
        let id = id.trim();
        if id.is_empty() {
            return Err(OrchestratorError::InvalidId(id.to_string()));
        }
        self.inner.ensure_not_stopped()?;

        let store = &self.inner.deps.store;
        let now = self.inner.deps.clock.now_ms();

        let result = match store.get(id).await? {
            Some(job) if job.status == JobStatus::Available => {
                debug!("already downloaded");
                return Ok(EnqueueResult::AlreadyDownloaded { job: Box::new(job) });
            }
            Some(job) if job.status.is_active() => {
                let position = self.inner.state().push(QueuedEntry::from_job(&job));
                EnqueueResult::AlreadyInQueue { position }
            }
            Some(job) => {
                info!(previous = %job.status, "re-queuing settled job");
                store.update(id, &JobPatch::reset_to_queued(now)).await?;
                let position = self.inner.state().push(QueuedEntry::from_job(&job));
                EnqueueResult::Queued { position }
            }
            None => {
                let mut job = DownloadJob::new(id, id, source, now);
                if let Some((title, size)) = self.inner.describe(id).await {
                    job.title = title;
                    job.expected_size = size;
                }
                match store.create(&job).await {
                    Ok(()) => {
                        let position = self.inner.state().push(QueuedEntry::from_job(&job));
                        info!(title = %job.title, position, "job queued");
                        EnqueueResult::Queued { position }
                    }
                    // Lost a race with a concurrent enqueue of the same id.
                    Err(StoreError::AlreadyExists(_)) => {
                        let position = self.inner.state().push(QueuedEntry::from_job(&job));
                        EnqueueResult::AlreadyInQueue { position }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        self.inner.publish().await;
        self.inner.ensure_running();
        Ok(result)
    }

    /// Cancels a pending or running job. Returns false if there was nothing to cancel.
    ///
    /// A pending job settles immediately. The running job is flagged and
    /// stops at the executor's next progress report. Once its transfer has
    /// finished the job can no longer be cancelled and this returns false.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] if the record cannot be updated.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let (was_pending, was_current) = {
            let mut state = self.inner.state();
            let was_current = state.current.as_deref() == Some(id);
            if was_current && state.finishing {
                debug!("transfer already finished; too late to cancel");
                return Ok(false);
            }
            let was_pending = state.remove(id);
            if was_current {
                state.cancel_current = true;
            }
            (was_pending, was_current)
        };

        let store = &self.inner.deps.store;
        if !was_pending && !was_current {
            match store.get(id).await? {
                Some(job) if job.status.is_active() => {}
                _ => return Ok(false),
            }
        }

        store
            .mark_cancelled(id, self.inner.deps.clock.now_ms())
            .await?;
        info!(running = was_current, "job cancelled");
        self.inner.publish().await;
        Ok(true)
    }

    /// Re-queues an `error` or `cancelled` job with both retry budgets reset.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for an unknown id,
    /// [`OrchestratorError::NotRetryable`] for any other status, and
    /// [`OrchestratorError::Stopped`] after shutdown.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn retry(&self, id: &str) -> Result<RetryOutcome> {
        self.inner.ensure_not_stopped()?;
        let store = &self.inner.deps.store;
        let job = store
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        if !job.status.is_retryable() {
            return Err(OrchestratorError::NotRetryable {
                id: id.to_string(),
                status: job.status,
            });
        }

        store
            .update(id, &JobPatch::reset_to_queued(self.inner.deps.clock.now_ms()))
            .await?;
        let position = self.inner.state().push(QueuedEntry::from_job(&job));
        info!(position, "job re-queued by request");

        self.inner.publish().await;
        self.inner.ensure_running();
        Ok(RetryOutcome {
            status: JobStatus::Queued,
            position,
        })
    }

    /// Deletes a job record, cancelling it first if it is pending or running.
    /// Returns false if no record existed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] if the record cannot be deleted.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn remove(&self, id: &str) -> Result<bool> {
        {
            let mut state = self.inner.state();
            state.remove(id);
            if state.current.as_deref() == Some(id) {
                state.cancel_current = true;
            }
        }
        let deleted = self.inner.deps.store.delete(id).await?;
        if deleted {
            info!("job removed");
        }
        self.inner.publish().await;
        Ok(deleted)
    }

    /// Deletes every `done`, `available`, `error` and `cancelled` job.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] on the first failing read or delete.
    #[instrument(skip(self))]
    pub async fn clear_settled(&self) -> Result<u64> {
        let store = &self.inner.deps.store;
        let current = self.inner.state().current.clone();
        let mut cleared = 0;

        for status in JobStatus::SETTLED {
            for job in store.get_by_status(status).await? {
                // The running job may pass through `done` on its way to `available`.
                if current.as_deref() == Some(job.id.as_str()) {
                    continue;
                }
                if store.delete(&job.id).await? {
                    cleared += 1;
                }
            }
        }

        info!(cleared, "cleared settled jobs");
        self.inner.publish().await;
        Ok(cleared)
    }

    /// Every job grouped by status, plus the current queue order.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Store`] if the store cannot be read.
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        Ok(self.inner.snapshot().await?)
    }

    /// 1-based position of `id` in the queue; the running job is 1.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.inner.state().position(id)
    }

    /// Id of the job being executed.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner.state().current.clone()
    }

    /// True when the loop is stopped and nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.state().is_idle()
    }

    /// Waits until the loop has drained the queue and exited.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Registers a callback for snapshot changes.
    ///
    /// Callbacks run on the orchestrator's task and should return quickly.
    /// A panicking callback is logged and does not affect the queue.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_not_stopped(&self) -> Result<()> {
        if self.state().stopped {
            Err(OrchestratorError::Stopped)
        } else {
            Ok(())
        }
    }

    fn should_abort(&self) -> bool {
        let state = self.state();
        state.cancel_current || state.stopped
    }

    /// Starts the loop if it is idle, or wakes it if it is sleeping.
    fn ensure_running(self: &Arc<Self>) {
        let mut state = self.state();
        if state.stopped {
            return;
        }
        if state.running {
            drop(state);
            self.wake.notify_one();
            return;
        }
        state.running = true;
        let inner = Arc::clone(self);
        state.worker = Some(tokio::spawn(inner.run_loop()));
    }

    async fn snapshot(&self) -> std::result::Result<QueueSnapshot, StoreError> {
        let mut snapshot = QueueSnapshot::default();
        for status in JobStatus::ALL {
            for job in self.deps.store.get_by_status(status).await? {
                snapshot.insert(job);
            }
        }
        let state = self.state();
        snapshot.current.clone_from(&state.current);
        snapshot.pending = state.pending.iter().map(|entry| entry.id.clone()).collect();
        Ok(snapshot)
    }

    /// Sends the current snapshot to subscribers. Never fails.
    async fn publish(&self) {
        if self.notifier.is_empty() {
            return;
        }
        match self.snapshot().await {
            Ok(snapshot) => self.notifier.publish(&snapshot),
            Err(e) => warn!(error = %e, "failed to build queue snapshot"),
        }
    }

    /// Catalog title and size for a new job.
    async fn describe(&self, id: &str) -> Option<(String, Option<u64>)> {
        match self.deps.catalog.lookup(id).await {
            Ok(Some(meta)) => {
                debug!(job_id = %id, title = %meta.title, authors = ?meta.authors, "catalog entry found");
                Some((meta.title, meta.size_bytes))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(job_id = %id, error = %e, "catalog lookup failed");
                None
            }
        }
    }

    async fn run_loop(self: Arc<Self>) {
        info!("queue processing started");
        self.publish().await;

        // Consecutive entries found not yet due; once it covers the whole
        // queue, everything is waiting on a quota backoff.
        let mut deferred = 0usize;
        while let Some(entry) = self.next_entry() {
            match self.process(entry).await {
                Step::Ran => deferred = 0,
                Step::Skipped => {}
                Step::Deferred => {
                    deferred += 1;
                    if deferred >= self.state().pending.len() {
                        deferred = 0;
                        self.quiesce().await;
                    }
                }
            }
        }

        info!("queue processing stopped");
        self.idle.notify_waiters();
        self.publish().await;
    }

    /// Pops the head and marks it current, or flags the loop as stopped.
    fn next_entry(&self) -> Option<QueuedEntry> {
        let mut state = self.state();
        let entry = if state.stopped {
            None
        } else {
            state.pending.pop_front()
        };
        match &entry {
            Some(entry) => {
                state.current = Some(entry.id.clone());
                state.cancel_current = false;
                state.finishing = false;
            }
            None => state.running = false,
        }
        entry
    }

    /// Clears the current marker, re-appending `requeue` to the tail.
    fn finish(&self, requeue: Option<QueuedEntry>) {
        let mut state = self.state();
        state.current = None;
        state.cancel_current = false;
        state.finishing = false;
        if let Some(entry) = requeue {
            state.push(entry);
        }
    }

    async fn quiesce(&self) {
        let interval = self.deps.settings.snapshot().quiescent_interval;
        debug!(
            interval_secs = interval.as_secs(),
            "every pending job is delayed; pausing"
        );
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = self.wake.notified() => {}
        }
    }

    async fn process(self: &Arc<Self>, entry: QueuedEntry) -> Step {
        let job = match self.deps.store.get(&entry.id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!(job_id = %entry.id, "job record gone; dropping queue entry");
                self.finish(None);
                return Step::Skipped;
            }
            Err(e) => {
                warn!(job_id = %entry.id, error = %e, "failed to load job; dropping queue entry");
                self.finish(None);
                return Step::Skipped;
            }
        };
        if job.status.is_settled() {
            self.finish(None);
            return Step::Skipped;
        }
        if job.is_waiting(self.deps.clock.now_ms()) {
            self.finish(Some(entry));
            return Step::Deferred;
        }
        if job.status == JobStatus::Delayed {
            info!(job_id = %job.id, "quota backoff elapsed; re-queuing");
            self.soft_update(&job.id, &JobPatch::transition(JobStatus::Queued))
                .await;
        }

        let requeue = self.run_job(entry, &job).await;
        self.finish(requeue);
        self.publish().await;
        Step::Ran
    }

    /// Executes one job and records the outcome. Returns the entry to re-queue, if any.
    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn run_job(self: &Arc<Self>, entry: QueuedEntry, job: &DownloadJob) -> Option<QueuedEntry> {
        let id = job.id.as_str();
        let settings = self.deps.settings.snapshot();

        if let Err(e) = self.deps.store.mark_started(id, self.deps.clock.now_ms()).await {
            warn!(error = %e, "failed to mark job started");
        }
        self.publish().await;
        info!(title = %job.title, "download started");

        let request = ExecuteRequest {
            id: id.to_string(),
            output_dir: settings.download_dir.clone(),
            start_mirror: entry.mirror_index,
        };
        let sink = JobProgress::new(Arc::clone(self), id);
        let outcome = self.deps.executor.execute(&request, &sink).await;

        let (cancelled, stopped) = {
            let mut state = self.state();
            if outcome.is_ok() && !state.cancel_current {
                state.finishing = true;
            }
            (state.cancel_current, state.stopped)
        };
        if cancelled {
            self.settle_cancelled(id, outcome.as_ref().ok().map(|file| file.path.as_path()))
                .await;
            return None;
        }
        if stopped && matches!(outcome, Err(DownloadError::Cancelled)) {
            info!("download interrupted by shutdown; will resume on next start");
            self.soft_update(id, &JobPatch::transition(JobStatus::Queued))
                .await;
            return None;
        }

        let (failure, message) = match outcome {
            Ok(file) => match pipeline::run(&self.deps, job, &file, &settings).await {
                Ok(PipelineOutcome::Settled(status)) => {
                    info!(%status, path = %file.path.display(), "download finished");
                    return None;
                }
                Ok(PipelineOutcome::Retry(message)) => (FailureType::Transient, message),
                Ok(PipelineOutcome::Failed(message)) => (FailureType::Configuration, message),
                Err(e) => {
                    warn!(error = %e, "failed to record finished download");
                    return None;
                }
            },
            Err(e) => (classify_error(&e), e.to_string()),
        };

        if failure == FailureType::Cancelled {
            self.settle_cancelled(id, None).await;
            return None;
        }

        let decision = retry::decide(failure, job, &settings, self.deps.clock.now_ms(), &message);
        self.soft_update(id, &decision.patch(&message, self.deps.clock.now_ms()))
            .await;
        match &decision {
            RetryDecision::Requeue { retry_count } => {
                warn!(retry_count, error = %message, "download failed; retrying");
            }
            RetryDecision::Delay {
                delayed_retry_count,
                next_retry_at,
            } => {
                warn!(
                    delayed_retry_count,
                    next_retry_at,
                    error = %message,
                    "origin quota reached; delaying"
                );
            }
            RetryDecision::Fail { message, .. } => {
                error!(error = %message, "download failed");
            }
        }

        decision.requeues().then(|| QueuedEntry {
            mirror_index: None,
            ..QueuedEntry::from_job(job)
        })
    }

    /// Cancellation wins over whatever the attempt produced.
    async fn settle_cancelled(&self, id: &str, downloaded: Option<&std::path::Path>) {
        info!(job_id = %id, "download cancelled");
        if let Some(path) = downloaded
            && let Err(e) = self.deps.files.delete_file(path).await
        {
            warn!(job_id = %id, error = %e, "failed to remove cancelled download");
        }
        if self.state().is_pending(id) {
            debug!(job_id = %id, "cancelled job was queued again; keeping its record");
            return;
        }
        match self
            .deps
            .store
            .mark_cancelled(id, self.deps.clock.now_ms())
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => debug!(job_id = %id, "cancelled job was removed"),
            Err(e) => warn!(job_id = %id, error = %e, "failed to mark job cancelled"),
        }
    }

    async fn soft_update(&self, id: &str, patch: &JobPatch) {
        if let Err(e) = self.deps.store.update(id, patch).await {
            warn!(job_id = %id, error = %e, "failed to update job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> QueuedEntry {
        QueuedEntry {
            id: id.to_string(),
            title: id.to_string(),
            mirror_index: None,
        }
    }

    #[test]
    fn test_positions_count_current_job_first() {
        let mut state = QueueState::default();
        assert_eq!(state.push(entry("a")), 1);
        assert_eq!(state.push(entry("b")), 2);

        state.pending.pop_front();
        state.current = Some("a".to_string());
        assert_eq!(state.position("a"), Some(1));
        assert_eq!(state.position("b"), Some(2));
        assert_eq!(state.push(entry("c")), 3);
    }

    #[test]
    fn test_push_never_duplicates() {
        let mut state = QueueState::default();
        state.current = Some("a".to_string());
        assert_eq!(state.push(entry("a")), 1);
        assert_eq!(state.push(entry("b")), 2);
        assert_eq!(state.push(entry("b")), 2);
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_cancelled_current_job_can_be_queued_again() {
        let mut state = QueueState::default();
        state.current = Some("a".to_string());
        state.cancel_current = true;
        assert_eq!(state.position("a"), None);

        assert_eq!(state.push(entry("a")), 2);
        assert!(state.is_pending("a"));
        assert_eq!(state.push(entry("a")), 2);
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut state = QueueState::default();
        state.push(entry("a"));
        assert!(state.remove("a"));
        assert!(!state.remove("a"));
        assert!(state.is_idle());
    }
}
