//! Fail-fast concurrency limiter for auxiliary resources.
//!
//! Unlike the download queue, callers that cannot be served soon are turned
//! away immediately: once `max_waiting` callers are already parked, further
//! [`BoundedLimiter::acquire`] calls return `None` so the caller can serve a
//! placeholder instead of piling up.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Semaphore with a capped wait list.
#[derive(Debug)]
pub struct BoundedLimiter {
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_waiting: usize,
}

/// Holds one wait-list slot; released on drop, including when the waiting
/// future is cancelled.
struct WaitSlot<'a>(&'a AtomicUsize);

impl Drop for WaitSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BoundedLimiter {
    /// `max_concurrent` is clamped to at least 1.
    #[must_use]
    pub fn new(max_concurrent: usize, max_waiting: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            waiting: AtomicUsize::new(0),
            max_waiting,
        }
    }

    /// Number of callers currently parked.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Takes a permit, waiting if needed. Returns `None` when the wait list is full.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Some(permit);
        }

        let reserved = self
            .waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_waiting).then_some(current + 1)
            });
        if reserved.is_err() {
            debug!(max_waiting = self.max_waiting, "limiter wait list full");
            return None;
        }
        let _slot = WaitSlot(&self.waiting);

        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Runs `fut` under a permit, or returns `placeholder` without running it.
    pub async fn run_or_else<F, T>(&self, fut: F, placeholder: T) -> T
    where
        F: Future<Output = T>,
    {
        match self.acquire().await {
            Some(_permit) => fut.await,
            None => placeholder,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let limiter = BoundedLimiter::new(2, 0);
        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_fails_fast_when_wait_list_full() {
        let limiter = Arc::new(BoundedLimiter::new(1, 1));
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await.is_some() })
        };
        while limiter.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(limiter.acquire().await.is_none());

        drop(held);
        assert!(waiter.await.unwrap());
        assert_eq!(limiter.waiting(), 0);
    }

    #[test]
    fn test_waiter_woken_when_permit_returns() {
        let limiter = BoundedLimiter::new(1, 1);
        let held = tokio_test::block_on(limiter.acquire()).unwrap();

        let mut waiter = tokio_test::task::spawn(limiter.acquire());
        tokio_test::assert_pending!(waiter.poll());
        assert_eq!(limiter.waiting(), 1);

        drop(held);
        assert!(waiter.is_woken());
        let permit = tokio_test::assert_ready!(waiter.poll());
        assert!(permit.is_some());
        assert_eq!(limiter.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_releases_slot() {
        let limiter = BoundedLimiter::new(1, 1);
        let _held = limiter.acquire().await.unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(timed_out.is_err());
        assert_eq!(limiter.waiting(), 0);
    }

    #[tokio::test]
    async fn test_run_or_else_serves_placeholder() {
        let limiter = BoundedLimiter::new(1, 0);
        let _held = limiter.acquire().await.unwrap();

        let value = limiter.run_or_else(async { "real" }, "placeholder").await;
        assert_eq!(value, "placeholder");
    }

    #[tokio::test]
    async fn test_run_or_else_runs_future() {
        let limiter = BoundedLimiter::new(1, 0);
        let value = limiter.run_or_else(async { 7 }, 0).await;
        assert_eq!(value, 7);
        assert_eq!(limiter.available_permits(), 1);
    }
}
