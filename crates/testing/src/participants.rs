//! Scripted participants for coordinator tests.
//!
//! A [`ScriptedParticipant`] behaves per a small script: reject or delay
//! its Try, fail its Confirm/Cancel a configured number of times before
//! succeeding, and count every phase delivery so tests can assert on the
//! coordinator's fan-out behavior.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tcc_engine_core::participant::{Participant, ParticipantError};
use tcc_engine_core::transaction::TxId;

/// Try-phase script.
#[derive(Debug, Clone, Default)]
enum TryScript {
    #[default]
    Accept,
    Reject(String),
    /// Sleep, then accept. Used to drive the coordinator past its
    /// Try-phase deadline.
    DelayThenAccept(Duration),
}

/// A participant whose behavior is scripted at construction.
#[derive(Debug)]
pub struct ScriptedParticipant {
    id: String,
    try_script: TryScript,
    /// Remaining confirm deliveries to fail with a retryable error.
    /// `u32::MAX` fails permanently.
    confirm_failures: AtomicU32,
    /// Same, for cancel.
    cancel_failures: AtomicU32,
    try_calls: AtomicU32,
    confirm_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

impl ScriptedParticipant {
    /// A participant that accepts everything.
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            try_script: TryScript::Accept,
            confirm_failures: AtomicU32::new(0),
            cancel_failures: AtomicU32::new(0),
            try_calls: AtomicU32::new(0),
            confirm_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    /// Reject every Try with a business error.
    pub fn with_try_rejection(mut self, reason: impl Into<String>) -> Self {
        self.try_script = TryScript::Reject(reason.into());
        self
    }

    /// Sleep before accepting the Try.
    pub fn with_try_delay(mut self, delay: Duration) -> Self {
        self.try_script = TryScript::DelayThenAccept(delay);
        self
    }

    /// Fail the first `n` confirm deliveries with a retryable error.
    pub fn with_confirm_failures(self, n: u32) -> Self {
        self.confirm_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every confirm delivery.
    pub fn with_permanent_confirm_failure(self) -> Self {
        self.with_confirm_failures(u32::MAX)
    }

    /// Fail the first `n` cancel deliveries with a retryable error.
    pub fn with_cancel_failures(self, n: u32) -> Self {
        self.cancel_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn try_count(&self) -> u32 {
        self.try_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_count(&self) -> u32 {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn consume_failure(counter: &AtomicU32) -> bool {
        loop {
            let remaining = counter.load(Ordering::SeqCst);
            if remaining == 0 {
                return false;
            }
            if remaining == u32::MAX {
                return true;
            }
            if counter
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> &str {
        &self.id
    }

    async fn try_reserve(&self, _tx_id: TxId) -> Result<(), ParticipantError> {
        self.try_calls.fetch_add(1, Ordering::SeqCst);
        match &self.try_script {
            TryScript::Accept => Ok(()),
            TryScript::Reject(reason) => Err(ParticipantError::Rejected(reason.clone())),
            TryScript::DelayThenAccept(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }

    async fn confirm(&self, _tx_id: TxId) -> Result<(), ParticipantError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if Self::consume_failure(&self.confirm_failures) {
            return Err(ParticipantError::Unavailable(format!(
                "{}: confirm endpoint down",
                self.id
            )));
        }
        Ok(())
    }

    async fn cancel(&self, _tx_id: TxId) -> Result<(), ParticipantError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if Self::consume_failure(&self.cancel_failures) {
            return Err(ParticipantError::Unavailable(format!(
                "{}: cancel endpoint down",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_every_phase() {
        let p = ScriptedParticipant::ok("a");

        p.try_reserve(TxId(1)).await.unwrap();
        p.confirm(TxId(1)).await.unwrap();
        p.confirm(TxId(1)).await.unwrap();

        assert_eq!(p.try_count(), 1);
        assert_eq!(p.confirm_count(), 2);
        assert_eq!(p.cancel_count(), 0);
    }

    #[tokio::test]
    async fn scripted_rejection() {
        let p = ScriptedParticipant::ok("a").with_try_rejection("out of stock");

        let err = p.try_reserve(TxId(1)).await.unwrap_err();
        assert!(matches!(err, ParticipantError::Rejected(_)));
    }

    #[tokio::test]
    async fn transient_confirm_failures_run_out() {
        let p = ScriptedParticipant::ok("a").with_confirm_failures(2);

        assert!(p.confirm(TxId(1)).await.is_err());
        assert!(p.confirm(TxId(1)).await.is_err());
        assert!(p.confirm(TxId(1)).await.is_ok());
        assert_eq!(p.confirm_count(), 3);
    }

    #[tokio::test]
    async fn permanent_confirm_failure_never_recovers() {
        let p = ScriptedParticipant::ok("a").with_permanent_confirm_failure();

        for _ in 0..10 {
            assert!(p.confirm(TxId(1)).await.is_err());
        }
    }
}
