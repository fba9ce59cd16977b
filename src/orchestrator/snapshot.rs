use std::collections::BTreeMap;

use serde::Serialize;

use crate::job::{DownloadJob, JobStatus};

/// Every job, grouped by status and keyed by id, plus the in-memory queue order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub available: BTreeMap<String, DownloadJob>,
    pub queued: BTreeMap<String, DownloadJob>,
    pub downloading: BTreeMap<String, DownloadJob>,
    pub delayed: BTreeMap<String, DownloadJob>,
    pub done: BTreeMap<String, DownloadJob>,
    pub error: BTreeMap<String, DownloadJob>,
    pub cancelled: BTreeMap<String, DownloadJob>,
    /// Job the loop is working on.
    pub current: Option<String>,
    /// Pending ids in processing order, excluding `current`.
    pub pending: Vec<String>,
}

impl QueueSnapshot {
    #[must_use]
    pub fn jobs(&self, status: JobStatus) -> &BTreeMap<String, DownloadJob> {
        match status {
            JobStatus::Available => &self.available,
            JobStatus::Queued => &self.queued,
            JobStatus::Downloading => &self.downloading,
            JobStatus::Delayed => &self.delayed,
            JobStatus::Done => &self.done,
            JobStatus::Error => &self.error,
            JobStatus::Cancelled => &self.cancelled,
        }
    }

    pub(super) fn insert(&mut self, job: DownloadJob) {
        let map = match job.status {
            JobStatus::Available => &mut self.available,
            JobStatus::Queued => &mut self.queued,
            JobStatus::Downloading => &mut self.downloading,
            JobStatus::Delayed => &mut self.delayed,
            JobStatus::Done => &mut self.done,
            JobStatus::Error => &mut self.error,
            JobStatus::Cancelled => &mut self.cancelled,
        };
        map.insert(job.id.clone(), job);
    }

    /// Looks a job up regardless of status.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DownloadJob> {
        JobStatus::ALL
            .iter()
            .find_map(|status| self.jobs(*status).get(id))
    }

    #[must_use]
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs(status).len()
    }

    /// True when nothing is queued, running or delayed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.current.is_none()
            && self.pending.is_empty()
            && JobStatus::ALL
                .iter()
                .filter(|status| status.is_active())
                .all(|status| self.jobs(*status).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSource;

    #[test]
    fn test_insert_groups_by_status() {
        let mut snapshot = QueueSnapshot::default();
        let mut job = DownloadJob::new("a", "A", JobSource::Web, 0);
        job.status = JobStatus::Error;
        snapshot.insert(job);
        snapshot.insert(DownloadJob::new("b", "B", JobSource::Web, 0));

        assert_eq!(snapshot.count(JobStatus::Error), 1);
        assert_eq!(snapshot.count(JobStatus::Queued), 1);
        assert_eq!(snapshot.get("a").map(|j| j.status), Some(JobStatus::Error));
        assert!(!snapshot.is_settled());
    }

    #[test]
    fn test_empty_snapshot_is_settled() {
        assert!(QueueSnapshot::default().is_settled());
    }
}
