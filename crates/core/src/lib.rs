//! # tcc-engine-core
//!
//! Core of a Try-Confirm-Cancel (TCC) distributed transaction
//! coordinator. Drives heterogeneous participants through a two-phase
//! protocol in which each participant exposes three idempotent
//! operations; for a given transaction, either every participant
//! eventually observes `confirm` or every participant eventually observes
//! `cancel`, across coordinator restarts and participant transient
//! failures.
//!
//! This crate defines the lifecycle engine and its ports. It has no
//! dependency on concrete storage engines or participant transports.
//!
//! ## Modules
//!
//! - [`transaction`]: durable data model ([`Transaction`], [`TxStatus`],
//!   [`TryStatus`])
//! - [`participant`]: the [`Participant`] capability contract
//! - [`store`]: the [`TxStore`] durable-log port and advisory lock
//! - [`retry`]: [`RetryExecutor`] with exponential backoff and jitter
//! - [`evaluator`]: aggregate-status derivation
//! - [`manager`]: [`TxManager`] lifecycle engine and reconciliation
//!   monitor
//! - [`metrics`]: injectable [`CoordinatorMetrics`] port
//! - [`error`]: coordinator error taxonomy and retry classification
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcc_engine_core::{CoordinatorConfig, TxManager};
//! use tcc_engine_testing::InMemoryTxStore;
//!
//! # async fn example() -> Result<(), tcc_engine_core::CoordinatorError> {
//! let store = Arc::new(InMemoryTxStore::new());
//! let manager = TxManager::new(
//!     CoordinatorConfig::default(),
//!     store,
//!     Arc::new(tcc_engine_core::InProcessMetrics::new()),
//! );
//!
//! let outcome = manager.start_transaction().await?;
//! println!("{} success={}", outcome.tx_id, outcome.success);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod evaluator;
pub mod manager;
pub mod metrics;
pub mod participant;
pub mod retry;
pub mod store;
pub mod transaction;

pub use error::{CoordinatorError, RetryClass};
pub use manager::{
    CoordinatorConfig, HealthReport, StartOptions, TryVerdict, TxManager, TxOutcome,
};
pub use metrics::{CoordinatorMetrics, InProcessMetrics, MetricsSnapshot};
pub use participant::{IdempotentParticipant, Participant, ParticipantError, Phase};
pub use retry::{RetryExecutor, RetryPolicy};
pub use store::{HANGING_BATCH_LIMIT, TxStore, TxStoreError};
pub use transaction::{ParticipantEntry, ParticipantId, Transaction, TryStatus, TxId, TxStatus};
