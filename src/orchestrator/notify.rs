//! Snapshot-change subscriptions.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::warn;

use super::QueueSnapshot;

type Callback = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;

/// Handle returned by [`Orchestrator::subscribe`](super::Orchestrator::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(super) struct Notifier {
    subscribers: DashMap<u64, Callback>,
    next_id: AtomicU64,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Notifier {
    pub(super) fn subscribe(&self, callback: Callback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, callback);
        SubscriptionId(id)
    }

    pub(super) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id.0).is_some()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Calls every subscriber. A panicking subscriber is logged and skipped.
    pub(super) fn publish(&self, snapshot: &QueueSnapshot) {
        // Callbacks run outside the map's shard locks so they may unsubscribe.
        let callbacks: Vec<(u64, Callback)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                warn!(subscriber = id, "subscriber panicked during notification");
            }
        }
    }
}
