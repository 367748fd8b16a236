//! # Monitor - Background Reconciliation
//!
//! Periodic sweep over hanging transactions. Each tick acquires the
//! cluster-wide advisory lock so at most one coordinator instance
//! advances a given batch; the lock reduces duplicate work but is not
//! load-bearing for correctness, which rests on store atomicity.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::TxManager;
use crate::error::CoordinatorError;
use crate::store::TxStore;

/// Monitor loop body. Spawned by [`TxManager::new`] when the monitor is
/// enabled; exits after the current iteration once `stop` is signalled.
pub(super) async fn run<S: TxStore + 'static>(manager: Arc<TxManager<S>>) {
    let interval = manager.config.monitor_interval;
    info!(
        instance = %manager.instance_id,
        interval_ms = interval.as_millis() as u64,
        "monitor started"
    );

    while !manager.stopping.load(Ordering::SeqCst) {
        wait(&manager, interval).await;
        if manager.stopping.load(Ordering::SeqCst) {
            break;
        }

        match tick(&manager).await {
            Ok(()) => {}
            Err(CoordinatorError::LockUnavailable) => {
                debug!(
                    instance = %manager.instance_id,
                    "another instance holds the reconciliation lock, skipping tick"
                );
            }
            Err(err) => {
                error!(instance = %manager.instance_id, error = %err, "monitor tick failed");
                // Back off against a sick backend.
                wait(&manager, 3 * interval).await;
            }
        }
    }

    info!(instance = %manager.instance_id, "monitor stopped");
}

/// Sleep that wakes early on stop.
async fn wait<S: TxStore + 'static>(manager: &TxManager<S>, duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = manager.stop_notify.notified() => {}
    }
}

/// One reconciliation tick: lock, sweep, unlock on every path.
async fn tick<S: TxStore + 'static>(manager: &TxManager<S>) -> Result<(), CoordinatorError> {
    let lock_expire = manager.config.monitor_interval * 2;
    manager
        .store
        .lock(lock_expire)
        .await
        .map_err(CoordinatorError::from_store)?;

    let outcome = sweep(manager).await;

    if let Err(err) = manager.store.unlock().await {
        warn!(error = %CoordinatorError::from_store(err), "advisory unlock failed");
    }

    outcome
}

/// Fetch the hanging batch and advance each transaction concurrently.
/// Individual failures are logged and never fail the tick.
async fn sweep<S: TxStore + 'static>(manager: &TxManager<S>) -> Result<(), CoordinatorError> {
    let batch = manager
        .store
        .hanging_txs()
        .await
        .map_err(CoordinatorError::from_store)?;
    manager.metrics.hanging_transactions(batch.len() as u64);

    if batch.is_empty() {
        return Ok(());
    }
    debug!(
        instance = %manager.instance_id,
        count = batch.len(),
        "advancing hanging transactions"
    );

    let mut advancements: FuturesUnordered<_> = batch
        .iter()
        .map(|tx| async move { (tx.id, manager.advance(tx).await) })
        .collect();

    while let Some((tx_id, result)) = advancements.next().await {
        if let Err(err) = result {
            warn!(%tx_id, error = %err, "advancement failed, will retry next tick");
        }
    }

    Ok(())
}
