//! Lock-free feed counters and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Feed pipeline counters, shared via `Arc`
pub struct Metrics {
    payloads_received: AtomicU64,
    readings_accepted: AtomicU64,
    readings_rejected: AtomicU64,
    readings_malformed: AtomicU64,
    devices_evicted: AtomicU64,
    reconnect_attempts: AtomicU64,
    batches_dropped: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            payloads_received: AtomicU64::new(0),
            readings_accepted: AtomicU64::new(0),
            readings_rejected: AtomicU64::new(0),
            readings_malformed: AtomicU64::new(0),
            devices_evicted: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_payload(&self) {
        self.payloads_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_readings(&self, accepted: u64, rejected: u64) {
        self.readings_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.readings_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self, count: u64) {
        self.readings_malformed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evictions(&self, count: u64) {
        self.devices_evicted.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        let uptime_secs = self.started_at.elapsed().as_secs();
        let payloads_received = self.payloads_received.load(Ordering::Relaxed);
        MetricsSummary {
            uptime_secs,
            payloads_received,
            payloads_per_sec: if uptime_secs > 0 {
                payloads_received as f64 / uptime_secs as f64
            } else {
                0.0
            },
            readings_accepted: self.readings_accepted.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            readings_malformed: self.readings_malformed.load(Ordering::Relaxed),
            devices_evicted: self.devices_evicted.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub payloads_received: u64,
    pub payloads_per_sec: f64,
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub readings_malformed: u64,
    pub devices_evicted: u64,
    pub reconnect_attempts: u64,
    pub batches_dropped: u64,
}

impl MetricsSummary {
    /// Log the summary as one structured event
    pub fn log(&self) {
        info!(
            uptime_secs = self.uptime_secs,
            payloads = self.payloads_received,
            payloads_per_sec = format!("{:.1}", self.payloads_per_sec),
            accepted = self.readings_accepted,
            rejected = self.readings_rejected,
            malformed = self.readings_malformed,
            evicted = self.devices_evicted,
            reconnects = self.reconnect_attempts,
            dropped_batches = self.batches_dropped,
            "feed_metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_payload();
        metrics.record_payload();
        metrics.record_readings(3, 1);
        metrics.record_readings(2, 0);
        metrics.record_malformed(1);
        metrics.record_evictions(2);
        metrics.record_reconnect();
        metrics.record_batch_dropped();

        let summary = metrics.summary();
        assert_eq!(summary.payloads_received, 2);
        assert_eq!(summary.readings_accepted, 5);
        assert_eq!(summary.readings_rejected, 1);
        assert_eq!(summary.readings_malformed, 1);
        assert_eq!(summary.devices_evicted, 2);
        assert_eq!(summary.reconnect_attempts, 1);
        assert_eq!(summary.batches_dropped, 1);
    }
}
