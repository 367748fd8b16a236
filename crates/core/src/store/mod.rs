//! # TxStore Port
//!
//! The durable transaction log contract. Backends (SQL, embedded KV,
//! in-memory for tests) implement [`TxStore`]; the coordinator only relies
//! on per-operation atomicity, durability of acknowledged writes, and the
//! advisory lock used to serialize monitor sweeps across instances.
//!
//! A transaction visible as `Hanging` after a restart must still reflect
//! the last durably-acknowledged per-participant update.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

use crate::error::RetryClass;
use crate::transaction::{ParticipantId, Transaction, TxId, TxStatus};

/// Upper bound on the batch returned by [`TxStore::hanging_txs`].
pub const HANGING_BATCH_LIMIT: usize = 100;

/// Errors from transaction log operations, generic over the backend's own
/// error type.
#[derive(Debug, Error)]
pub enum TxStoreError<E> {
    /// The store has no record of the transaction.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TxId),

    /// The participant id was not part of the set recorded at creation.
    #[error("participant {participant_id} not recorded for transaction {tx_id}")]
    ParticipantNotFound {
        tx_id: TxId,
        participant_id: ParticipantId,
    },

    /// A submit that conflicts with an already-terminal status.
    #[error("transaction {tx_id} already submitted as {current}")]
    InvalidTransactionState { tx_id: TxId, current: TxStatus },

    /// The advisory lock could not be acquired within the wait budget.
    #[error("advisory lock unavailable")]
    LockUnavailable,

    /// Backend-specific transient error.
    #[error("backend error: {0:?}")]
    Backend(E),
}

impl<E> From<E> for TxStoreError<E> {
    fn from(err: E) -> Self {
        TxStoreError::Backend(err)
    }
}

impl<E> TxStoreError<E> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TxStoreError::TransactionNotFound(_))
    }
}

impl<E> RetryClass for TxStoreError<E> {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TxStoreError::Backend(_) | TxStoreError::LockUnavailable
        )
    }
}

/// Durable log of transactions and per-participant try statuses, plus the
/// cluster-wide advisory lock.
#[async_trait]
pub trait TxStore: Send + Sync {
    /// The backend's error type, wrapped as [`TxStoreError::Backend`].
    type Error: Debug + Send + Sync + 'static;

    /// Write a new transaction with every entry `Hanging` and return the
    /// store-assigned monotonic id.
    async fn create_tx(
        &self,
        participants: &[ParticipantId],
    ) -> Result<TxId, TxStoreError<Self::Error>>;

    /// Atomically record the Try outcome for a single participant entry.
    ///
    /// First non-`Hanging` write wins: a later write to a settled entry is
    /// ignored, which is what protects an early recorded `Failure` against
    /// a late `Successful` from an abandoned Try. SQL backends implement
    /// this with a guarded `UPDATE ... WHERE try_status = 'hanging'`.
    async fn update_try_status(
        &self,
        tx_id: TxId,
        participant_id: &ParticipantId,
        accept: bool,
    ) -> Result<(), TxStoreError<Self::Error>>;

    /// Atomically set the aggregate status to `Successful` (`success`) or
    /// `Failure`. Idempotent for the same value; a conflicting value for a
    /// terminal transaction fails with
    /// [`TxStoreError::InvalidTransactionState`].
    async fn submit(&self, tx_id: TxId, success: bool) -> Result<(), TxStoreError<Self::Error>>;

    /// Transactions still `Hanging`, ascending by creation time, at most
    /// [`HANGING_BATCH_LIMIT`] of them.
    async fn hanging_txs(&self) -> Result<Vec<Transaction>, TxStoreError<Self::Error>>;

    async fn get_tx(&self, tx_id: TxId) -> Result<Transaction, TxStoreError<Self::Error>>;

    /// Acquire the cluster-wide advisory lock, waiting at most `expire`.
    /// An acquired lock also expires after `expire`, so a crashed holder
    /// cannot starve the monitor forever.
    async fn lock(&self, expire: Duration) -> Result<(), TxStoreError<Self::Error>>;

    /// Release the advisory lock. No-op when not held by this caller.
    async fn unlock(&self) -> Result<(), TxStoreError<Self::Error>>;
}
