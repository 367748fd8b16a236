//! # tcc-engine-testing
//!
//! Testing utilities for tcc-engine with in-memory implementations.
//! Provides [`InMemoryTxStore`] (a full, instrumented implementation of
//! the store contract) and [`ScriptedParticipant`] for driving the
//! coordinator through failure scenarios without a database or network.

pub mod memory_tx_store;
pub mod participants;

pub use memory_tx_store::{InMemoryTxStore, InMemoryTxStoreError};
pub use participants::ScriptedParticipant;
