//! # tcc-engine-metrics
//!
//! Prometheus implementation of the coordinator metrics port.

use prometheus::{Encoder, TextEncoder};
use std::time::Duration;

use tcc_engine_core::metrics::{CoordinatorMetrics, MetricsSnapshot};
use tcc_engine_core::participant::Phase;

/// Prometheus metrics for the TCC coordinator.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: prometheus::Registry,

    transactions_started: prometheus::IntCounter,
    transactions_confirmed: prometheus::IntCounter,
    transactions_cancelled: prometheus::IntCounter,
    try_timeouts: prometheus::IntCounter,
    participant_retries: prometheus::IntCounterVec,
    hanging_transactions: prometheus::IntGauge,
    try_phase_duration: prometheus::Histogram,
}

impl PrometheusMetrics {
    /// Create metrics with default Try-phase duration buckets.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    }

    /// Create metrics with custom Try-phase duration buckets (seconds).
    pub fn with_buckets(try_buckets: Vec<f64>) -> Result<Self, prometheus::Error> {
        let registry = prometheus::Registry::new();

        let transactions_started = prometheus::IntCounter::with_opts(prometheus::opts!(
            "tcc_transactions_started_total",
            "Total transactions started"
        ))?;
        registry.register(Box::new(transactions_started.clone()))?;

        let transactions_confirmed = prometheus::IntCounter::with_opts(prometheus::opts!(
            "tcc_transactions_confirmed_total",
            "Total transactions submitted as successful"
        ))?;
        registry.register(Box::new(transactions_confirmed.clone()))?;

        let transactions_cancelled = prometheus::IntCounter::with_opts(prometheus::opts!(
            "tcc_transactions_cancelled_total",
            "Total transactions submitted as failed"
        ))?;
        registry.register(Box::new(transactions_cancelled.clone()))?;

        let try_timeouts = prometheus::IntCounter::with_opts(prometheus::opts!(
            "tcc_try_timeouts_total",
            "Try phases that hit the transaction deadline"
        ))?;
        registry.register(Box::new(try_timeouts.clone()))?;

        let participant_retries = prometheus::IntCounterVec::new(
            prometheus::opts!(
                "tcc_participant_retries_total",
                "Retried participant deliveries by phase"
            ),
            &["phase"],
        )?;
        registry.register(Box::new(participant_retries.clone()))?;

        let hanging_transactions = prometheus::IntGauge::with_opts(prometheus::opts!(
            "tcc_hanging_transactions",
            "Size of the last hanging batch the monitor fetched"
        ))?;
        registry.register(Box::new(hanging_transactions.clone()))?;

        let try_phase_duration = prometheus::Histogram::with_opts(prometheus::histogram_opts!(
            "tcc_try_phase_duration_seconds",
            "Try-phase duration in seconds",
            try_buckets
        ))?;
        registry.register(Box::new(try_phase_duration.clone()))?;

        Ok(Self {
            registry,
            transactions_started,
            transactions_confirmed,
            transactions_cancelled,
            try_timeouts,
            participant_retries,
            hanging_transactions,
            try_phase_duration,
        })
    }

    pub fn registry(&self) -> &prometheus::Registry {
        &self.registry
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    fn retries_total(&self) -> u64 {
        [Phase::Try, Phase::Confirm, Phase::Cancel]
            .iter()
            .map(|phase| {
                self.participant_retries
                    .with_label_values(&[phase.as_str()])
                    .get()
            })
            .sum()
    }
}

impl CoordinatorMetrics for PrometheusMetrics {
    fn transaction_started(&self) {
        self.transactions_started.inc();
    }

    fn transaction_confirmed(&self) {
        self.transactions_confirmed.inc();
    }

    fn transaction_cancelled(&self) {
        self.transactions_cancelled.inc();
    }

    fn try_timeout(&self) {
        self.try_timeouts.inc();
    }

    fn participant_retry(&self, phase: Phase) {
        self.participant_retries
            .with_label_values(&[phase.as_str()])
            .inc();
    }

    fn hanging_transactions(&self, count: u64) {
        self.hanging_transactions.set(count as i64);
    }

    fn try_phase_duration(&self, duration: Duration) {
        self.try_phase_duration.observe(duration.as_secs_f64());
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_started: self.transactions_started.get(),
            transactions_confirmed: self.transactions_confirmed.get(),
            transactions_cancelled: self.transactions_cancelled.get(),
            try_timeouts: self.try_timeouts.get(),
            participant_retries: self.retries_total(),
            hanging_transactions: self.hanging_transactions.get().max(0) as u64,
        }
    }
}
