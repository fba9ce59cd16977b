//! Executor progress written through to the job record.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::download::{ProgressControl, ProgressSink, ProgressUpdate};
use crate::job::JobPatch;

use super::Inner;

/// Records progress on the job and doubles as the cancellation check.
pub(super) struct JobProgress {
    inner: Arc<Inner>,
    id: String,
}

impl JobProgress {
    pub(super) fn new(inner: Arc<Inner>, id: &str) -> Self {
        Self {
            inner,
            id: id.to_string(),
        }
    }

    fn control(&self) -> ProgressControl {
        if self.inner.should_abort() {
            ProgressControl::Abort
        } else {
            ProgressControl::Continue
        }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, update: ProgressUpdate) -> ProgressControl {
        if self.control() == ProgressControl::Abort {
            return ProgressControl::Abort;
        }

        let store = &self.inner.deps.store;
        let recorded = match update {
            ProgressUpdate::BypassingProtection { mirror } => {
                debug!(job_id = %self.id, mirror, "resolving mirror");
                let patch = JobPatch {
                    mirror_index: Some(Some(mirror)),
                    countdown_seconds: Some(None),
                    countdown_started_at: Some(None),
                    ..JobPatch::default()
                };
                store.update(&self.id, &patch).await
            }
            ProgressUpdate::WaitingCountdown { seconds } => {
                debug!(job_id = %self.id, seconds, "waiting out countdown");
                store
                    .set_countdown(&self.id, seconds, self.inner.deps.clock.now_ms())
                    .await
            }
            ProgressUpdate::Downloading {
                downloaded,
                total,
                speed,
                eta_seconds,
                ..
            } => {
                let patch = JobPatch {
                    downloaded_bytes: Some(downloaded),
                    total_bytes: Some(total),
                    speed: Some(Some(speed)),
                    eta_seconds: Some(eta_seconds),
                    countdown_seconds: Some(None),
                    countdown_started_at: Some(None),
                    ..JobPatch::default()
                };
                store.update(&self.id, &patch).await
            }
        };
        if let Err(e) = recorded {
            warn!(job_id = %self.id, error = %e, "failed to record progress");
        }

        self.inner.publish().await;
        self.control()
    }
}
