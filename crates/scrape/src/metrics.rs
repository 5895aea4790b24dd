use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct ScrapeMetrics {
    // Counters
    fetches_started: AtomicUsize,
    fetches_succeeded: AtomicUsize,
    fetches_failed: AtomicUsize,

    // Concurrency
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,

    // Timing (in microseconds)
    total_fetch_time_us: AtomicU64,
}

impl ScrapeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a fetch as in flight until the returned timer is finished or dropped
    pub fn record_start(&self) -> FetchTimer<'_> {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        FetchTimer {
            metrics: self,
            start: Instant::now(),
            success: false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = self.fetches_succeeded.load(Ordering::Relaxed)
            + self.fetches_failed.load(Ordering::Relaxed);
        let total_us = self.total_fetch_time_us.load(Ordering::Relaxed) as f64;

        MetricsSnapshot {
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight(),
            avg_fetch_time_ms: if finished > 0 {
                total_us / finished as f64 / 1000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub fetches_started: usize,
    pub fetches_succeeded: usize,
    pub fetches_failed: usize,
    pub peak_in_flight: usize,
    pub avg_fetch_time_ms: f64,
}

/// One in-flight fetch. Dropping it without [`FetchTimer::finish`] (a panicking
/// fetch unwinds through it) counts the fetch as failed.
pub struct FetchTimer<'a> {
    metrics: &'a ScrapeMetrics,
    start: Instant,
    success: bool,
}

impl FetchTimer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(mut self, success: bool) {
        self.success = success;
    }
}

impl Drop for FetchTimer<'_> {
    fn drop(&mut self) {
        let metrics = self.metrics;
        metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
        metrics
            .total_fetch_time_us
            .fetch_add(self.elapsed().as_micros() as u64, Ordering::Relaxed);
        if self.success {
            metrics.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            metrics.fetches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_max_in_flight() {
        let metrics = ScrapeMetrics::new();

        let a = metrics.record_start();
        let b = metrics.record_start();
        a.finish(true);
        let c = metrics.record_start();
        b.finish(false);
        c.finish(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetches_started, 3);
        assert_eq!(snapshot.fetches_succeeded, 2);
        assert_eq!(snapshot.fetches_failed, 1);
        assert_eq!(snapshot.peak_in_flight, 2);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_unwound_fetch_leaves_flight() {
        let metrics = ScrapeMetrics::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _timer = metrics.record_start();
            panic!("fetch blew up");
        }));

        assert!(result.is_err());
        assert_eq!(metrics.in_flight(), 0);
        assert_eq!(metrics.snapshot().fetches_failed, 1);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ScrapeMetrics::new().snapshot();
        assert_eq!(snapshot.fetches_started, 0);
        assert_eq!(snapshot.avg_fetch_time_ms, 0.0);
    }
}
