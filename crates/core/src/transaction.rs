//! # Transaction Model
//!
//! Durable data model for TCC transactions: identifiers, per-participant
//! try statuses and the aggregate transaction record the store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Store-assigned transaction identifier. Monotonic and unique per store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Stable participant identity. Duplicate ids are rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Outcome of a participant's Try as recorded in the store.
///
/// An entry only ever transitions `Hanging -> Successful` or
/// `Hanging -> Failure`; the store ignores writes to a settled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TryStatus {
    Hanging,
    Successful,
    Failure,
}

impl TryStatus {
    pub fn is_hanging(&self) -> bool {
        matches!(self, TryStatus::Hanging)
    }
}

/// Aggregate transaction status. `Successful` and `Failure` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Hanging,
    Successful,
    Failure,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Successful | TxStatus::Failure)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Hanging => f.write_str("hanging"),
            TxStatus::Successful => f.write_str("successful"),
            TxStatus::Failure => f.write_str("failure"),
        }
    }
}

/// Per-participant record inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub participant_id: ParticipantId,
    pub try_status: TryStatus,
}

/// The durable unit the coordinator drives to a terminal state.
///
/// The key set of `participant_statuses` is fixed at creation; entries are
/// never added or removed afterwards, and `created_at` is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub status: TxStatus,
    pub participant_statuses: BTreeMap<ParticipantId, ParticipantEntry>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a fresh transaction with every entry `Hanging`.
    pub fn new(
        id: TxId,
        participants: impl IntoIterator<Item = ParticipantId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let participant_statuses = participants
            .into_iter()
            .map(|pid| {
                (
                    pid.clone(),
                    ParticipantEntry {
                        participant_id: pid,
                        try_status: TryStatus::Hanging,
                    },
                )
            })
            .collect();

        Self {
            id,
            status: TxStatus::Hanging,
            participant_statuses,
            created_at,
        }
    }

    pub fn entry(&self, participant_id: &ParticipantId) -> Option<&ParticipantEntry> {
        self.participant_statuses.get(participant_id)
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participant_statuses.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_party_tx() -> Transaction {
        Transaction::new(
            TxId(7),
            [ParticipantId::from("inventory"), ParticipantId::from("payment")],
            Utc::now(),
        )
    }

    #[test]
    fn new_transaction_starts_hanging() {
        let tx = two_party_tx();

        assert_eq!(tx.status, TxStatus::Hanging);
        assert_eq!(tx.participant_statuses.len(), 2);
        assert!(
            tx.participant_statuses
                .values()
                .all(|e| e.try_status == TryStatus::Hanging)
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TxStatus::Hanging.is_terminal());
        assert!(TxStatus::Successful.is_terminal());
        assert!(TxStatus::Failure.is_terminal());
    }

    #[test]
    fn entry_lookup() {
        let tx = two_party_tx();

        let entry = tx.entry(&ParticipantId::from("payment")).unwrap();
        assert_eq!(entry.participant_id.as_str(), "payment");
        assert!(tx.entry(&ParticipantId::from("shipping")).is_none());
    }

    #[test]
    fn serialized_id_field_is_named_id() {
        let tx = two_party_tx();

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["id"], serde_json::json!(7));
        assert_eq!(
            json["participant_statuses"]["inventory"]["try_status"],
            serde_json::json!("hanging")
        );
    }

    #[test]
    fn transaction_round_trips_through_json() {
        let tx = two_party_tx();

        let json = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.id, tx.id);
        assert_eq!(decoded.status, tx.status);
        assert_eq!(decoded.participant_statuses, tx.participant_statuses);
    }
}
