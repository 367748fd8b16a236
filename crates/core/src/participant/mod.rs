//! # Participant Port
//!
//! The capability contract every TCC participant implements: `try_reserve`
//! to reserve resources, `confirm` to finalize, `cancel` to release. The
//! coordinator never knows whether a participant is in-process, HTTP or
//! RPC; transports are adapter concerns behind this trait.
//!
//! All three operations must be idempotent for the same logical
//! transaction: the coordinator guarantees at-least-once delivery of
//! `confirm`/`cancel`, nothing more.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::RetryClass;
use crate::transaction::TxId;

mod idempotent;

pub use idempotent::IdempotentParticipant;

/// Phase of the TCC protocol an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Try,
    Confirm,
    Cancel,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Try => "try",
            Phase::Confirm => "confirm",
            Phase::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by participant operations.
///
/// `Rejected` and `Protocol` are terminal; `Unavailable` and `Timeout`
/// are transport-level and retryable.
#[derive(Debug, Clone, Error)]
pub enum ParticipantError {
    /// Business-level rejection of a Try.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Downstream unreachable or transport failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation, e.g. a confirm for an unknown reservation.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl RetryClass for ParticipantError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ParticipantError::Unavailable(_) | ParticipantError::Timeout(_)
        )
    }
}

/// A downstream service participating in TCC transactions.
///
/// Contract the coordinator relies on:
/// - `try_reserve` may fail for business reasons; any such failure aborts
///   the transaction.
/// - `confirm` must eventually succeed once the matching `try_reserve`
///   has; the coordinator retries it under the retry policy.
/// - `cancel` must eventually succeed and may be delivered for
///   transactions whose `try_reserve` never completed.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Stable identity used as the registry key and the durable entry key.
    fn id(&self) -> &str;

    /// Reserve resources for the transaction.
    async fn try_reserve(&self, tx_id: TxId) -> Result<(), ParticipantError>;

    /// Finalize a reservation.
    async fn confirm(&self, tx_id: TxId) -> Result<(), ParticipantError>;

    /// Release a reservation.
    async fn cancel(&self, tx_id: TxId) -> Result<(), ParticipantError>;

    /// Dispatch by phase. Adapters exposing a single wire endpoint per
    /// participant route through this.
    async fn execute(&self, phase: Phase, tx_id: TxId) -> Result<(), ParticipantError> {
        match phase {
            Phase::Try => self.try_reserve(tx_id).await,
            Phase::Confirm => self.confirm(tx_id).await,
            Phase::Cancel => self.cancel(tx_id).await,
        }
    }
}
