// pea: metrics (A3, §10.4)

// ACCEPTABLE: Mutex poisoning .expect() is allowed in this module (unrecoverable error)
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time counters plus latency percentiles, following the reference
/// crate's `MetricsCollector`/`snapshot()` split between cheap atomic
/// counters and a bounded ring buffer for percentile math.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub suppressed: u64,
    pub dropped_backpressure: u64,
    pub executor_errors: u64,
    pub dump_count: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

pub struct PeaMetrics {
    received: AtomicU64,
    sent: AtomicU64,
    suppressed: AtomicU64,
    dropped_backpressure: AtomicU64,
    executor_errors: AtomicU64,
    dump_count: AtomicU64,
    handle_latencies_ms: Mutex<VecDeque<u64>>,
    max_latency_samples: usize,
}

impl PeaMetrics {
    pub fn new(max_latency_samples: usize) -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            dropped_backpressure: AtomicU64::new(0),
            executor_errors: AtomicU64::new(0),
            dump_count: AtomicU64::new(0),
            handle_latencies_ms: Mutex::new(VecDeque::with_capacity(max_latency_samples)),
            max_latency_samples,
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backpressure_drop(&self) {
        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_executor_error(&self) {
        self.executor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dump(&self) {
        self.dump_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handle_latency(&self, latency_ms: u64) {
        let mut samples = self
            .handle_latencies_ms
            .lock()
            .expect("metrics mutex poisoned");
        samples.push_back(latency_ms);
        if samples.len() > self.max_latency_samples {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted: Vec<u64> = self
            .handle_latencies_ms
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .copied()
            .collect();
        sorted.sort_unstable();

        let percentile = |p: f64| -> u64 {
            if sorted.is_empty() {
                return 0;
            }
            let idx = ((sorted.len() as f64) * p) as usize;
            sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(0)
        };

        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            executor_errors: self.executor_errors.load(Ordering::Relaxed),
            dump_count: self.dump_count.load(Ordering::Relaxed),
            p50_ms: percentile(0.50),
            p95_ms: percentile(0.95),
            p99_ms: percentile(0.99),
        }
    }
}

/// Brackets one `handle` call and records its duration on drop-free finish,
/// mirroring the reference crate's `LatencyTimer::start`/`finish` pair.
pub struct HandleLatencyTimer<'a> {
    start: Instant,
    metrics: &'a PeaMetrics,
}

impl<'a> HandleLatencyTimer<'a> {
    pub fn start(metrics: &'a PeaMetrics) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        self.metrics.record_handle_latency(elapsed.as_millis() as u64);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = PeaMetrics::new(16);
        let snap = metrics.snapshot();
        assert_eq!(snap.received, 0);
        assert_eq!(snap.sent, 0);
    }

    #[test]
    fn counters_increment_independently() {
        let metrics = PeaMetrics::new(16);
        metrics.record_received();
        metrics.record_received();
        metrics.record_sent();
        metrics.record_suppressed();
        metrics.record_backpressure_drop();
        metrics.record_executor_error();
        metrics.record_dump();

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.suppressed, 1);
        assert_eq!(snap.dropped_backpressure, 1);
        assert_eq!(snap.executor_errors, 1);
        assert_eq!(snap.dump_count, 1);
    }

    #[test]
    fn latency_ring_buffer_evicts_oldest_beyond_capacity() {
        let metrics = PeaMetrics::new(3);
        for ms in [10, 20, 30, 40] {
            metrics.record_handle_latency(ms);
        }
        // only the last 3 survive; p99 should reflect the highest of those.
        let snap = metrics.snapshot();
        assert_eq!(snap.p99_ms, 40);
    }

    #[test]
    fn timer_records_on_finish() {
        let metrics = PeaMetrics::new(16);
        let timer = HandleLatencyTimer::start(&metrics);
        timer.finish();
        let snap = metrics.snapshot();
        assert_eq!(snap.p50_ms, snap.p50_ms); // recorded without panicking
    }
}
