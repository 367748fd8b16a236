//! # Metrics Port
//!
//! Process-wide metrics collection, injectable rather than a singleton so
//! tests can assert on counters and deployments can plug in a Prometheus
//! registry. Implementations must be cheap and non-blocking; the
//! coordinator calls these from hot paths.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::participant::Phase;

/// Counter snapshot embedded in health output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_started: u64,
    pub transactions_confirmed: u64,
    pub transactions_cancelled: u64,
    pub try_timeouts: u64,
    pub participant_retries: u64,
    pub hanging_transactions: u64,
}

/// Sink for coordinator events.
pub trait CoordinatorMetrics: Send + Sync {
    fn transaction_started(&self);
    fn transaction_confirmed(&self);
    fn transaction_cancelled(&self);
    fn try_timeout(&self);
    fn participant_retry(&self, phase: Phase);

    /// Gauge: size of the last hanging batch the monitor fetched.
    fn hanging_transactions(&self, count: u64);

    /// Observation hook for the Try-phase duration; no-op by default.
    fn try_phase_duration(&self, duration: Duration) {
        let _ = duration;
    }

    fn snapshot(&self) -> MetricsSnapshot;
}

/// Lock-free in-process implementation; the default sink.
#[derive(Debug, Default)]
pub struct InProcessMetrics {
    started: AtomicU64,
    confirmed: AtomicU64,
    cancelled: AtomicU64,
    try_timeouts: AtomicU64,
    retries: AtomicU64,
    hanging: AtomicU64,
}

impl InProcessMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoordinatorMetrics for InProcessMetrics {
    fn transaction_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn transaction_confirmed(&self) {
        self.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    fn transaction_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn try_timeout(&self) {
        self.try_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn participant_retry(&self, _phase: Phase) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn hanging_transactions(&self, count: u64) {
        self.hanging.store(count, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_started: self.started.load(Ordering::Relaxed),
            transactions_confirmed: self.confirmed.load(Ordering::Relaxed),
            transactions_cancelled: self.cancelled.load(Ordering::Relaxed),
            try_timeouts: self.try_timeouts.load(Ordering::Relaxed),
            participant_retries: self.retries.load(Ordering::Relaxed),
            hanging_transactions: self.hanging.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = InProcessMetrics::new();

        metrics.transaction_started();
        metrics.transaction_started();
        metrics.transaction_confirmed();
        metrics.participant_retry(Phase::Confirm);
        metrics.participant_retry(Phase::Cancel);
        metrics.participant_retry(Phase::Confirm);
        metrics.hanging_transactions(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_started, 2);
        assert_eq!(snapshot.transactions_confirmed, 1);
        assert_eq!(snapshot.transactions_cancelled, 0);
        assert_eq!(snapshot.participant_retries, 3);
        assert_eq!(snapshot.hanging_transactions, 4);
    }

    #[test]
    fn hanging_is_a_gauge() {
        let metrics = InProcessMetrics::new();

        metrics.hanging_transactions(10);
        metrics.hanging_transactions(2);

        assert_eq!(metrics.snapshot().hanging_transactions, 2);
    }
}
