//! # State Evaluator
//!
//! Pure aggregation of per-participant try statuses into the transaction
//! status. `Failure` dominates `Hanging`, both dominate `Successful`:
//! a transaction with any recorded failure is advanced to Cancel even
//! while other entries are still hanging, so Try reservations are never
//! orphaned behind a slow sibling.

use crate::transaction::{Transaction, TryStatus, TxStatus};

/// Derive the aggregate status from the transaction's recorded entries.
///
/// The durable participant set fixed at creation is authoritative; the
/// live registry plays no part here, so a restarted coordinator cannot
/// mis-derive `Successful` from a subset of entries.
pub fn aggregate(tx: &Transaction) -> TxStatus {
    let mut any_hanging = false;

    for entry in tx.participant_statuses.values() {
        match entry.try_status {
            TryStatus::Failure => return TxStatus::Failure,
            TryStatus::Hanging => any_hanging = true,
            TryStatus::Successful => {}
        }
    }

    if any_hanging {
        TxStatus::Hanging
    } else {
        TxStatus::Successful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ParticipantId, TxId};
    use chrono::Utc;

    fn tx_with(statuses: &[(&str, TryStatus)]) -> Transaction {
        let mut tx = Transaction::new(
            TxId(1),
            statuses.iter().map(|(id, _)| ParticipantId::from(*id)),
            Utc::now(),
        );
        for (id, status) in statuses {
            tx.participant_statuses
                .get_mut(&ParticipantId::from(*id))
                .unwrap()
                .try_status = *status;
        }
        tx
    }

    #[test]
    fn all_successful_aggregates_successful() {
        let tx = tx_with(&[
            ("a", TryStatus::Successful),
            ("b", TryStatus::Successful),
        ]);
        assert_eq!(aggregate(&tx), TxStatus::Successful);
    }

    #[test]
    fn any_hanging_aggregates_hanging() {
        let tx = tx_with(&[("a", TryStatus::Successful), ("b", TryStatus::Hanging)]);
        assert_eq!(aggregate(&tx), TxStatus::Hanging);
    }

    #[test]
    fn failure_dominates_hanging() {
        // The load-bearing tie-break: a failed entry forces Cancel even
        // while a sibling is still in flight.
        let tx = tx_with(&[
            ("a", TryStatus::Hanging),
            ("b", TryStatus::Failure),
            ("c", TryStatus::Successful),
        ]);
        assert_eq!(aggregate(&tx), TxStatus::Failure);
    }

    #[test]
    fn single_failure_aggregates_failure() {
        let tx = tx_with(&[("a", TryStatus::Successful), ("b", TryStatus::Failure)]);
        assert_eq!(aggregate(&tx), TxStatus::Failure);
    }

    #[test]
    fn fresh_transaction_is_hanging() {
        let tx = tx_with(&[("a", TryStatus::Hanging), ("b", TryStatus::Hanging)]);
        assert_eq!(aggregate(&tx), TxStatus::Hanging);
    }
}
