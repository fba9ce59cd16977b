use thiserror::Error;

use crate::job::{JobStatus, StoreError};

/// Errors returned by [`Orchestrator`](super::Orchestrator) operations.
///
/// Failures inside the processing loop are never surfaced here; they are
/// logged and recorded on the job.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("no job with id {0}")]
    NotFound(String),

    #[error("job {id} is {status}; only error or cancelled jobs can be retried")]
    NotRetryable { id: String, status: JobStatus },

    #[error("invalid job id {0:?}")]
    InvalidId(String),

    #[error("orchestrator has been shut down")]
    Stopped,
}
