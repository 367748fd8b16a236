//! # Basic Coordinator Example
//!
//! Runs a TCC transaction across two in-process participants against the
//! in-memory store.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --package tcc-engine-core --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use tcc_engine_core::{CoordinatorConfig, RetryPolicy, TxManager, TxStore};
use tcc_engine_testing::{InMemoryTxStore, ScriptedParticipant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let store = Arc::new(InMemoryTxStore::new());
    let config = CoordinatorConfig::new()
        .with_try_timeout(Duration::from_secs(5))
        .with_monitor_interval(Duration::from_millis(500))
        .with_retry(RetryPolicy::aggressive());
    let manager = TxManager::new(
        config,
        Arc::clone(&store),
        Arc::new(tcc_engine_core::InProcessMetrics::new()),
    );

    manager.register(Arc::new(ScriptedParticipant::ok("inventory")))?;
    // The payment confirm endpoint flakes once before recovering.
    manager.register(Arc::new(
        ScriptedParticipant::ok("payment").with_confirm_failures(1),
    ))?;

    let outcome = manager.start_transaction().await?;
    println!(
        "{}: success={} verdict={:?}",
        outcome.tx_id, outcome.success, outcome.verdict
    );

    let tx = store.get_tx(outcome.tx_id).await?;
    println!("durable status: {}", tx.status);
    for entry in tx.participant_statuses.values() {
        println!("  {} -> {:?}", entry.participant_id, entry.try_status);
    }

    println!("health: {:?}", manager.health());

    manager.stop().await;
    Ok(())
}
