//! # TxManager - Transaction Lifecycle Engine
//!
//! Holds the per-instance participant registry, executes the Try phase
//! with a transaction-level deadline, advances transactions to
//! Confirm/Cancel through the retry executor, and owns the background
//! reconciliation monitor.
//!
//! The manager itself keeps no durable state: everything that must
//! survive a restart lives behind the [`TxStore`] port. The registry, the
//! monitor flag and the instance id are transient per-process state.

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CoordinatorError, RetryClass};
use crate::evaluator;
use crate::metrics::{CoordinatorMetrics, InProcessMetrics, MetricsSnapshot};
use crate::participant::{Participant, Phase};
use crate::retry::RetryExecutor;
use crate::store::TxStore;
use crate::transaction::{ParticipantId, Transaction, TxId, TxStatus};

pub mod config;
mod monitor;

pub use config::CoordinatorConfig;

/// Discriminated outcome of the Try phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryVerdict {
    /// Every participant accepted within the budget.
    Ok,
    /// The Try-phase timer expired first.
    Timeout,
    /// A participant rejected or failed its Try, or a terminal status
    /// write made the outcome unrecordable.
    BusinessFailure,
}

/// Result returned to callers of [`TxManager::start_transaction`].
///
/// Business-level Try rejections and timeouts are carried here, not
/// thrown; only infrastructure errors surface as [`CoordinatorError`].
#[derive(Debug, Clone, Copy)]
pub struct TxOutcome {
    pub tx_id: TxId,
    pub success: bool,
    pub verdict: TryVerdict,
}

/// Per-call options for [`TxManager::start_transaction_with`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Overrides the configured Try-phase budget for this transaction.
    pub timeout: Option<Duration>,
    /// Caller-supplied context, logged but not persisted.
    pub metadata: Option<serde_json::Value>,
}

/// Health report for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub instance_id: String,
    pub participants_count: usize,
    pub monitor_enabled: bool,
    pub metrics: MetricsSnapshot,
}

type Registry = HashMap<ParticipantId, Arc<dyn Participant>>;

/// The transaction coordinator.
pub struct TxManager<S: TxStore + 'static> {
    config: CoordinatorConfig,
    store: Arc<S>,
    participants: RwLock<Registry>,
    retry: RetryExecutor,
    metrics: Arc<dyn CoordinatorMetrics>,
    instance_id: String,
    stopping: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: TxStore + 'static> TxManager<S> {
    /// Create a manager and, when configured, spawn its monitor. Must be
    /// called from within a tokio runtime.
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<S>,
        metrics: Arc<dyn CoordinatorMetrics>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            retry: RetryExecutor::new(config.retry.clone()),
            config,
            store,
            participants: RwLock::new(HashMap::new()),
            metrics,
            instance_id: format!("tcc-{:08x}", rand::random::<u32>()),
            stopping: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            monitor_handle: Mutex::new(None),
        });

        if manager.config.enable_monitor {
            let handle = tokio::spawn(monitor::run(Arc::clone(&manager)));
            *manager.monitor_handle.lock() = Some(handle);
        }

        manager
    }

    /// Manager with default configuration and in-process metrics.
    pub fn with_defaults(store: Arc<S>) -> Arc<Self> {
        Self::new(
            CoordinatorConfig::default(),
            store,
            Arc::new(InProcessMetrics::new()),
        )
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Add a participant to this instance's registry.
    pub fn register(&self, participant: Arc<dyn Participant>) -> Result<(), CoordinatorError> {
        let id = ParticipantId::new(participant.id());
        let mut registry = self.participants.write();
        if registry.contains_key(&id) {
            return Err(CoordinatorError::DuplicateParticipant(id));
        }
        debug!(instance = %self.instance_id, participant = %id, "participant registered");
        registry.insert(id, participant);
        Ok(())
    }

    /// Drive a new transaction through Try and, best-effort, to a terminal
    /// state.
    pub async fn start_transaction(&self) -> Result<TxOutcome, CoordinatorError> {
        self.start_transaction_with(StartOptions::default()).await
    }

    pub async fn start_transaction_with(
        &self,
        opts: StartOptions,
    ) -> Result<TxOutcome, CoordinatorError> {
        let snapshot = self.registry_snapshot();
        if snapshot.is_empty() {
            return Err(CoordinatorError::NoParticipantsRegistered);
        }

        let ids: Vec<ParticipantId> = snapshot.iter().map(|(id, _)| id.clone()).collect();
        let tx_id = self
            .store
            .create_tx(&ids)
            .await
            .map_err(CoordinatorError::from_store)?;
        self.metrics.transaction_started();

        let timeout = opts.timeout.unwrap_or(self.config.try_timeout);
        info!(
            instance = %self.instance_id,
            %tx_id,
            participants = snapshot.len(),
            timeout_ms = timeout.as_millis() as u64,
            metadata = ?opts.metadata,
            "transaction started"
        );

        let started = Instant::now();
        let verdict = self.run_try_phase(tx_id, timeout, &snapshot).await;
        self.metrics.try_phase_duration(started.elapsed());

        // Foreground advancement is best-effort; anything left hanging is
        // re-driven by the monitor.
        if let Err(err) = self.advance_by_id(tx_id).await {
            warn!(%tx_id, error = %err, "foreground advancement deferred to monitor");
        }

        Ok(TxOutcome {
            tx_id,
            success: matches!(verdict, TryVerdict::Ok),
            verdict,
        })
    }

    /// Parallel Try fan-out raced against the transaction deadline.
    ///
    /// Tasks keep running after abandonment; the store's first-writer-wins
    /// rule resolves their late status updates against the failures the
    /// coordinator records on timeout.
    async fn run_try_phase(
        &self,
        tx_id: TxId,
        timeout: Duration,
        snapshot: &[(ParticipantId, Arc<dyn Participant>)],
    ) -> TryVerdict {
        let mut pending = FuturesUnordered::new();
        for (id, participant) in snapshot {
            let id = id.clone();
            let participant = Arc::clone(participant);
            let store = Arc::clone(&self.store);
            pending.push(tokio::spawn(async move {
                let accepted = match participant.try_reserve(tx_id).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%tx_id, participant = %id, error = %err, "try rejected");
                        false
                    }
                };
                let update = store.update_try_status(tx_id, &id, accepted).await;
                (id, accepted, update)
            }));
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut observed: HashSet<ParticipantId> = HashSet::new();
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(%tx_id, timeout_ms = timeout.as_millis() as u64, "try phase timed out");
                    self.metrics.try_timeout();
                    self.fail_unobserved(tx_id, snapshot, &observed).await;
                    return TryVerdict::Timeout;
                }
                joined = pending.next() => {
                    match joined {
                        None => return TryVerdict::Ok,
                        Some(Ok((id, accepted, update))) => {
                            observed.insert(id.clone());
                            if let Err(err) = update {
                                if err.is_retryable() {
                                    // The Try may still have reached the
                                    // participant; its idempotency
                                    // obligation covers redelivery.
                                    warn!(%tx_id, participant = %id, error = %err,
                                        "try status write failed");
                                } else {
                                    error!(%tx_id, participant = %id, error = %err,
                                        "terminal try status write failure");
                                    return TryVerdict::BusinessFailure;
                                }
                            }
                            if !accepted {
                                // First failure flips the transaction;
                                // remaining tries are abandoned.
                                return TryVerdict::BusinessFailure;
                            }
                        }
                        Some(Err(join_err)) => {
                            error!(%tx_id, error = %join_err, "try task aborted");
                            return TryVerdict::BusinessFailure;
                        }
                    }
                }
            }
        }
    }

    /// Record `Failure` for every participant whose Try outcome was not
    /// observed before the deadline. In-flight tries that settle first win
    /// the entry; this write wins against anything later.
    async fn fail_unobserved(
        &self,
        tx_id: TxId,
        snapshot: &[(ParticipantId, Arc<dyn Participant>)],
        observed: &HashSet<ParticipantId>,
    ) {
        for (id, _) in snapshot {
            if observed.contains(id) {
                continue;
            }
            if let Err(err) = self.store.update_try_status(tx_id, id, false).await {
                warn!(%tx_id, participant = %id, error = %err,
                    "could not record timeout failure");
            }
        }
    }

    /// Fetch and advance a transaction. Idempotent.
    pub async fn advance_by_id(&self, tx_id: TxId) -> Result<(), CoordinatorError> {
        let tx = self
            .store
            .get_tx(tx_id)
            .await
            .map_err(CoordinatorError::from_store)?;
        self.advance(&tx).await
    }

    /// Advance a transaction toward its terminal state. Idempotent: a
    /// still-hanging aggregate is left for the next monitor tick, a
    /// terminal transaction is a no-op.
    pub async fn advance(&self, tx: &Transaction) -> Result<(), CoordinatorError> {
        if tx.status.is_terminal() {
            debug!(tx_id = %tx.id, status = %tx.status, "transaction already submitted");
            return Ok(());
        }

        match evaluator::aggregate(tx) {
            TxStatus::Hanging => {
                debug!(tx_id = %tx.id, "aggregate still hanging, deferring");
                Ok(())
            }
            TxStatus::Successful => self.finalize(tx, Phase::Confirm).await,
            TxStatus::Failure => self.finalize(tx, Phase::Cancel).await,
        }
    }

    /// Concurrent Confirm or Cancel fan-out over the transaction's durable
    /// participant set, each delivery under the retry executor. `submit`
    /// is only reached once every participant has resolved; otherwise the
    /// transaction stays hanging and the monitor re-drives it.
    async fn finalize(&self, tx: &Transaction, phase: Phase) -> Result<(), CoordinatorError> {
        let mut unresolved: Vec<CoordinatorError> = Vec::new();
        let mut deliveries = FuturesUnordered::new();

        for id in tx.participant_ids() {
            let Some(participant) = self.resolve(id) else {
                unresolved.push(CoordinatorError::ParticipantNotRegistered(id.clone()));
                continue;
            };
            let id = id.clone();
            let tx_id = tx.id;
            let metrics = Arc::clone(&self.metrics);
            let retry = &self.retry;
            deliveries.push(async move {
                let result = retry
                    .run_observed(
                        || {
                            let participant = Arc::clone(&participant);
                            async move { participant.execute(phase, tx_id).await }
                        },
                        |_, _| metrics.participant_retry(phase),
                    )
                    .await;
                (id, result)
            });
        }

        while let Some((id, result)) = deliveries.next().await {
            if let Err(err) = result {
                match phase {
                    // Cancel failures never flip an aborted transaction;
                    // they only delay its submission.
                    Phase::Cancel => warn!(
                        tx_id = %tx.id, participant = %id, error = %err,
                        "cancel delivery unresolved"
                    ),
                    _ => error!(
                        tx_id = %tx.id, participant = %id, error = %err,
                        "confirm delivery unresolved"
                    ),
                }
                unresolved.push(CoordinatorError::RetriesExhausted {
                    tx_id: tx.id,
                    participant_id: id,
                    phase,
                    source: err,
                });
            }
        }

        if let Some(first) = unresolved.into_iter().next() {
            // Leaving the transaction hanging is the safe state.
            return Err(first);
        }

        let success = phase == Phase::Confirm;
        self.store
            .submit(tx.id, success)
            .await
            .map_err(CoordinatorError::from_store)?;

        if success {
            self.metrics.transaction_confirmed();
        } else {
            self.metrics.transaction_cancelled();
        }
        info!(tx_id = %tx.id, outcome = %phase, "transaction submitted");
        Ok(())
    }

    /// Signal the monitor to stop and join it. In-flight transactions are
    /// allowed to complete; callers are expected to drain first.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handle = self.monitor_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "monitor join failed");
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            healthy: !self.stopping.load(Ordering::SeqCst),
            instance_id: self.instance_id.clone(),
            participants_count: self.participants.read().len(),
            monitor_enabled: self.config.enable_monitor,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Clone out the registry so no lock is held across suspension points.
    fn registry_snapshot(&self) -> Vec<(ParticipantId, Arc<dyn Participant>)> {
        self.participants
            .read()
            .iter()
            .map(|(id, p)| (id.clone(), Arc::clone(p)))
            .collect()
    }

    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.participants.read().get(id).cloned()
    }
}
