//! Idempotency decorator for participants.
//!
//! The coordinator delivers `confirm`/`cancel` at least once; downstreams
//! that cannot deduplicate on their own can be wrapped in
//! [`IdempotentParticipant`], which swallows redeliveries of an already
//! succeeded phase. The core never assumes this wrapper is present.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use super::{Participant, ParticipantError, Phase};
use crate::transaction::TxId;

/// Wraps a participant and deduplicates successful phase deliveries per
/// `(transaction, phase)` key. Failed deliveries are not recorded, so they
/// remain retryable.
pub struct IdempotentParticipant<P> {
    inner: P,
    delivered: Mutex<HashSet<(TxId, Phase)>>,
}

impl<P: Participant> IdempotentParticipant<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            delivered: Mutex::new(HashSet::new()),
        }
    }

    /// Number of distinct deliveries recorded so far.
    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }

    async fn deduplicated(&self, phase: Phase, tx_id: TxId) -> Result<(), ParticipantError> {
        if self.delivered.lock().contains(&(tx_id, phase)) {
            return Ok(());
        }
        self.inner.execute(phase, tx_id).await?;
        self.delivered.lock().insert((tx_id, phase));
        Ok(())
    }
}

#[async_trait]
impl<P: Participant> Participant for IdempotentParticipant<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn try_reserve(&self, tx_id: TxId) -> Result<(), ParticipantError> {
        self.deduplicated(Phase::Try, tx_id).await
    }

    async fn confirm(&self, tx_id: TxId) -> Result<(), ParticipantError> {
        self.deduplicated(Phase::Confirm, tx_id).await
    }

    async fn cancel(&self, tx_id: TxId) -> Result<(), ParticipantError> {
        self.deduplicated(Phase::Cancel, tx_id).await
    }
}
