//! Two-budget retry policy.
//!
//! Transient failures draw from `retry_count` and are re-queued immediately.
//! Quota failures draw from `delayed_retry_count` and wait out
//! `quota_backoff` in the `delayed` state. The budgets are independent.

use std::time::Duration;

use crate::download::FailureType;
use crate::job::{DownloadJob, JobPatch, JobStatus};
use crate::ports::Settings;

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to the tail of the queue.
    Requeue { retry_count: u32 },
    /// Park until `next_retry_at`, then re-queue.
    Delay {
        delayed_retry_count: u32,
        next_retry_at: i64,
    },
    /// Settle as `error`.
    Fail {
        message: String,
        retry_count: u32,
        delayed_retry_count: u32,
    },
}

/// Decides the next state for `job` after a failure of kind `failure`.
///
/// Cancellation is handled by the caller and never reaches this function;
/// if it does, the job is failed without touching either budget.
#[must_use]
pub fn decide(
    failure: FailureType,
    job: &DownloadJob,
    settings: &Settings,
    now_ms: i64,
    message: &str,
) -> RetryDecision {
    match failure {
        FailureType::Transient => {
            let retry_count = job.retry_count.saturating_add(1);
            if retry_count < settings.max_retries {
                RetryDecision::Requeue { retry_count }
            } else {
                RetryDecision::Fail {
                    message: message.to_string(),
                    retry_count,
                    delayed_retry_count: job.delayed_retry_count,
                }
            }
        }
        FailureType::Quota => {
            let delayed_retry_count = job.delayed_retry_count.saturating_add(1);
            if delayed_retry_count < settings.quota_max_retries {
                RetryDecision::Delay {
                    delayed_retry_count,
                    next_retry_at: now_ms.saturating_add(duration_ms(settings.quota_backoff)),
                }
            } else {
                RetryDecision::Fail {
                    message: format!(
                        "gave up after {delayed_retry_count} quota retries; quota may not have reset: {message}"
                    ),
                    retry_count: job.retry_count,
                    delayed_retry_count,
                }
            }
        }
        FailureType::Configuration | FailureType::Cancelled => RetryDecision::Fail {
            message: message.to_string(),
            retry_count: job.retry_count,
            delayed_retry_count: job.delayed_retry_count,
        },
    }
}

impl RetryDecision {
    /// Record update for this decision. `message` is kept as the job's last error.
    #[must_use]
    pub fn patch(&self, message: &str, now_ms: i64) -> JobPatch {
        match self {
            // Every mirror was tried; the next attempt starts from the first.
            Self::Requeue { retry_count } => JobPatch {
                retry_count: Some(*retry_count),
                mirror_index: Some(None),
                ..JobPatch::transition(JobStatus::Queued).error(message)
            },
            Self::Delay {
                delayed_retry_count,
                next_retry_at,
            } => JobPatch {
                delayed_retry_count: Some(*delayed_retry_count),
                mirror_index: Some(None),
                ..JobPatch::transition(JobStatus::Delayed)
                    .retry_at(*next_retry_at)
                    .error(message)
            },
            Self::Fail {
                message,
                retry_count,
                delayed_retry_count,
            } => JobPatch {
                retry_count: Some(*retry_count),
                delayed_retry_count: Some(*delayed_retry_count),
                ..JobPatch::transition(JobStatus::Error)
                    .error(message.as_str())
                    .completed_at(now_ms)
            },
        }
    }

    /// Whether the job goes back into the in-memory queue.
    #[must_use]
    pub fn requeues(&self) -> bool {
        !matches!(self, Self::Fail { .. })
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
