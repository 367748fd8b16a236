//! # Error Taxonomy
//!
//! Coordinator-level errors and the retryable-vs-terminal classification
//! that drives the retry executor. Classification is by error kind, never
//! by message: infrastructure failures retry, logical failures surface.

use thiserror::Error;

use crate::participant::{ParticipantError, Phase};
use crate::store::TxStoreError;
use crate::transaction::{ParticipantId, TxId};

/// Retryable-vs-terminal classification by error kind.
///
/// Retryable errors cause backoff-and-retry inside the executor; terminal
/// errors surface immediately.
pub trait RetryClass {
    fn is_retryable(&self) -> bool;
}

/// Top-level coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A transaction cannot be started against an empty registry.
    #[error("no participants registered")]
    NoParticipantsRegistered,

    /// Registration with an id that is already present.
    #[error("duplicate participant: {0}")]
    DuplicateParticipant(ParticipantId),

    /// A durable entry names a participant this instance has no
    /// registration for; the transaction stays hanging until an instance
    /// that knows the participant picks it up.
    #[error("participant {0} is not registered on this instance")]
    ParticipantNotRegistered(ParticipantId),

    /// The store has no record of the transaction.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TxId),

    /// The store refused to move a terminal transaction.
    #[error("invalid transaction state for {0}")]
    InvalidTransactionState(TxId),

    /// A participant id that was never recorded at creation time.
    #[error("participant {participant_id} not recorded for transaction {tx_id}")]
    ParticipantNotRecorded {
        tx_id: TxId,
        participant_id: ParticipantId,
    },

    /// Transient backend failure, safe to retry.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The cluster-wide advisory lock could not be acquired in time.
    #[error("advisory lock unavailable")]
    LockUnavailable,

    /// A confirm or cancel delivery that did not succeed within the retry
    /// budget. The transaction is left hanging for the monitor.
    #[error("{phase} retries exhausted for participant {participant_id} in {tx_id}")]
    RetriesExhausted {
        tx_id: TxId,
        participant_id: ParticipantId,
        phase: Phase,
        #[source]
        source: ParticipantError,
    },
}

impl CoordinatorError {
    /// Collapse a store error into the coordinator taxonomy, preserving
    /// its kind.
    pub fn from_store<E: std::fmt::Debug>(err: TxStoreError<E>) -> Self {
        match err {
            TxStoreError::TransactionNotFound(tx_id) => Self::TransactionNotFound(tx_id),
            TxStoreError::ParticipantNotFound {
                tx_id,
                participant_id,
            } => Self::ParticipantNotRecorded {
                tx_id,
                participant_id,
            },
            TxStoreError::InvalidTransactionState { tx_id, .. } => {
                Self::InvalidTransactionState(tx_id)
            }
            TxStoreError::LockUnavailable => Self::LockUnavailable,
            TxStoreError::Backend(inner) => Self::Storage(format!("{inner:?}")),
        }
    }
}

impl RetryClass for CoordinatorError {
    fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::Storage(_) | CoordinatorError::LockUnavailable => true,
            CoordinatorError::RetriesExhausted { .. } => false,
            CoordinatorError::NoParticipantsRegistered
            | CoordinatorError::DuplicateParticipant(_)
            | CoordinatorError::ParticipantNotRegistered(_)
            | CoordinatorError::TransactionNotFound(_)
            | CoordinatorError::InvalidTransactionState(_)
            | CoordinatorError::ParticipantNotRecorded { .. } => false,
        }
    }
}

/// Result type with the coordinator error.
pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_retryable() {
        assert!(CoordinatorError::Storage("connection reset".into()).is_retryable());
        assert!(CoordinatorError::LockUnavailable.is_retryable());
    }

    #[test]
    fn logical_errors_are_terminal() {
        assert!(!CoordinatorError::NoParticipantsRegistered.is_retryable());
        assert!(!CoordinatorError::DuplicateParticipant(ParticipantId::from("x")).is_retryable());
        assert!(!CoordinatorError::TransactionNotFound(TxId(1)).is_retryable());
    }

    #[test]
    fn store_error_mapping_preserves_kind() {
        let err = CoordinatorError::from_store(TxStoreError::<String>::TransactionNotFound(TxId(9)));
        assert!(matches!(err, CoordinatorError::TransactionNotFound(TxId(9))));

        let err = CoordinatorError::from_store(TxStoreError::Backend("io".to_string()));
        assert!(matches!(err, CoordinatorError::Storage(_)));
        assert!(err.is_retryable());
    }
}
