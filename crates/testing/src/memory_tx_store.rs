//! In-memory implementation of the transaction store for testing.
//!
//! Thread-safe, honors the full store contract (monotonic ids,
//! first-writer-wins entry updates, terminal-submit enforcement, bounded
//! hanging batches, expiring advisory lock) and records submit calls and
//! lock holders so property tests can assert on coordinator behavior.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tcc_engine_core::store::{HANGING_BATCH_LIMIT, TxStore, TxStoreError};
use tcc_engine_core::transaction::{ParticipantId, Transaction, TryStatus, TxId, TxStatus};

/// Error type for [`InMemoryTxStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryTxStoreError {
    #[error("internal error: {0}")]
    Internal(String),
}

/// In-memory transaction store.
///
/// Transactions are keyed by their monotonic id, so iteration order is
/// also `created_at` order.
#[derive(Debug, Default)]
pub struct InMemoryTxStore {
    transactions: RwLock<BTreeMap<TxId, Transaction>>,
    next_id: AtomicU64,
    /// Advisory lock holder expiry, `None` when free.
    lock_expiry: Mutex<Option<Instant>>,
    /// Instrumentation: every `submit` call in order, including no-ops.
    submit_calls: RwLock<Vec<(TxId, bool)>>,
    /// Instrumentation: concurrent lock holders, and the maximum ever
    /// observed (must stay 1 under a correct monitor).
    lock_holders: AtomicI32,
    max_lock_holders: AtomicI32,
}

impl InMemoryTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions stored.
    pub fn tx_count(&self) -> usize {
        self.transactions.read().len()
    }

    /// All `submit` invocations observed, in call order.
    pub fn submit_calls(&self) -> Vec<(TxId, bool)> {
        self.submit_calls.read().clone()
    }

    /// `submit` invocations for one transaction.
    pub fn submit_calls_for(&self, tx_id: TxId) -> Vec<bool> {
        self.submit_calls
            .read()
            .iter()
            .filter(|(id, _)| *id == tx_id)
            .map(|(_, success)| *success)
            .collect()
    }

    /// Highest number of concurrent advisory-lock holders observed.
    pub fn max_lock_holders(&self) -> i32 {
        self.max_lock_holders.load(Ordering::SeqCst)
    }

    /// Drop all state, including instrumentation.
    pub fn clear(&self) {
        self.transactions.write().clear();
        self.submit_calls.write().clear();
        *self.lock_expiry.lock() = None;
    }

    fn acquire(&self) {
        let holders = self.lock_holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lock_holders.fetch_max(holders, Ordering::SeqCst);
    }

    fn release(&self) {
        self.lock_holders.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TxStore for InMemoryTxStore {
    type Error = InMemoryTxStoreError;

    async fn create_tx(
        &self,
        participants: &[ParticipantId],
    ) -> Result<TxId, TxStoreError<Self::Error>> {
        if participants.is_empty() {
            return Err(InMemoryTxStoreError::Internal(
                "transaction without participants".to_string(),
            )
            .into());
        }

        let id = TxId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let tx = Transaction::new(id, participants.iter().cloned(), Utc::now());
        self.transactions.write().insert(id, tx);
        Ok(id)
    }

    async fn update_try_status(
        &self,
        tx_id: TxId,
        participant_id: &ParticipantId,
        accept: bool,
    ) -> Result<(), TxStoreError<Self::Error>> {
        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(&tx_id)
            .ok_or(TxStoreError::TransactionNotFound(tx_id))?;
        let entry = tx.participant_statuses.get_mut(participant_id).ok_or_else(|| {
            TxStoreError::ParticipantNotFound {
                tx_id,
                participant_id: participant_id.clone(),
            }
        })?;

        // First non-Hanging write wins; later writes are ignored.
        if entry.try_status.is_hanging() {
            entry.try_status = if accept {
                TryStatus::Successful
            } else {
                TryStatus::Failure
            };
        }
        Ok(())
    }

    async fn submit(&self, tx_id: TxId, success: bool) -> Result<(), TxStoreError<Self::Error>> {
        self.submit_calls.write().push((tx_id, success));

        let mut transactions = self.transactions.write();
        let tx = transactions
            .get_mut(&tx_id)
            .ok_or(TxStoreError::TransactionNotFound(tx_id))?;

        let target = if success {
            TxStatus::Successful
        } else {
            TxStatus::Failure
        };

        match tx.status {
            TxStatus::Hanging => {
                tx.status = target;
                Ok(())
            }
            current if current == target => Ok(()),
            current => Err(TxStoreError::InvalidTransactionState { tx_id, current }),
        }
    }

    async fn hanging_txs(&self) -> Result<Vec<Transaction>, TxStoreError<Self::Error>> {
        Ok(self
            .transactions
            .read()
            .values()
            .filter(|tx| tx.status == TxStatus::Hanging)
            .take(HANGING_BATCH_LIMIT)
            .cloned()
            .collect())
    }

    async fn get_tx(&self, tx_id: TxId) -> Result<Transaction, TxStoreError<Self::Error>> {
        self.transactions
            .read()
            .get(&tx_id)
            .cloned()
            .ok_or(TxStoreError::TransactionNotFound(tx_id))
    }

    async fn lock(&self, expire: Duration) -> Result<(), TxStoreError<Self::Error>> {
        let deadline = Instant::now() + expire;
        loop {
            {
                let mut expiry = self.lock_expiry.lock();
                let free = match *expiry {
                    None => true,
                    Some(held_until) if held_until <= Instant::now() => {
                        // The previous holder expired without unlocking;
                        // reclaim its slot before taking over.
                        self.release();
                        true
                    }
                    Some(_) => false,
                };
                if free {
                    *expiry = Some(Instant::now() + expire);
                    self.acquire();
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(TxStoreError::LockUnavailable);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn unlock(&self) -> Result<(), TxStoreError<Self::Error>> {
        let mut expiry = self.lock_expiry.lock();
        if expiry.take().is_some() {
            self.release();
        }
        Ok(())
    }
}
