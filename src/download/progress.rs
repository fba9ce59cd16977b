//! Progress reporting from the executor to its caller.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// A status transition or transfer sample.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Resolving a mirror page through the bypass proxy.
    BypassingProtection { mirror: u32 },
    /// Waiting out a mirror's countdown.
    WaitingCountdown { seconds: u32 },
    /// Streaming the file.
    Downloading {
        downloaded: u64,
        total: Option<u64>,
        percent: Option<f64>,
        /// Bytes per second since the previous sample.
        speed: f64,
        eta_seconds: Option<u64>,
    },
}

/// What the caller wants the executor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressControl {
    Continue,
    /// Stop, delete any partial file and return `DownloadError::Cancelled`.
    Abort,
}

/// Receives progress from the executor. Checked at every report, so it is
/// also the cooperative cancellation point.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, update: ProgressUpdate) -> ProgressControl;
}

/// A sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _update: ProgressUpdate) -> ProgressControl {
        ProgressControl::Continue
    }
}

/// Turns cumulative byte counts into throughput samples on a fixed cadence.
///
/// Speed is the byte delta since the previous sample divided by the elapsed
/// time, so it tracks instantaneous rather than average throughput.
#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    interval: Duration,
    last_at: Instant,
    last_bytes: u64,
}

impl ThroughputSampler {
    #[must_use]
    pub fn new(interval: Duration, started_at: Instant) -> Self {
        Self {
            interval,
            last_at: started_at,
            last_bytes: 0,
        }
    }

    /// Returns a sample if at least one interval has passed since the last one.
    pub fn sample(&mut self, now: Instant, downloaded: u64, total: Option<u64>) -> Option<ProgressUpdate> {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < self.interval {
            return None;
        }
        Some(self.take(elapsed, downloaded, total, now))
    }

    /// Emits a sample regardless of cadence (used once the stream ends).
    pub fn finish(&mut self, now: Instant, downloaded: u64, total: Option<u64>) -> ProgressUpdate {
        let elapsed = now.saturating_duration_since(self.last_at);
        self.take(elapsed, downloaded, total, now)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn take(&mut self, elapsed: Duration, downloaded: u64, total: Option<u64>, now: Instant) -> ProgressUpdate {
        let delta = downloaded.saturating_sub(self.last_bytes);
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 { delta as f64 / secs } else { 0.0 };

        let percent = total
            .filter(|t| *t > 0)
            .map(|t| (downloaded as f64 / t as f64 * 100.0).min(100.0));
        let eta_seconds = match total {
            Some(t) if speed > 0.0 => Some((t.saturating_sub(downloaded) as f64 / speed).ceil() as u64),
            Some(t) if t <= downloaded => Some(0),
            _ => None,
        };

        self.last_at = now;
        self.last_bytes = downloaded;

        ProgressUpdate::Downloading {
            downloaded,
            total,
            percent,
            speed,
            eta_seconds,
        }
    }
}
