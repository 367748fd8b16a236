//! End-to-end lifecycle tests driving the coordinator against the
//! in-memory store and scripted participants.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tcc_engine_core::{
    CoordinatorConfig, CoordinatorError, CoordinatorMetrics, InProcessMetrics, RetryPolicy,
    StartOptions, TryStatus, TryVerdict, TxManager, TxStatus, TxStore,
};
use tcc_engine_core::transaction::ParticipantId;
use tcc_engine_testing::{InMemoryTxStore, ScriptedParticipant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::standard()
        .with_base_delay(Duration::from_millis(2))
        .with_max_delay(Duration::from_millis(10))
        .with_jitter(Duration::ZERO)
}

fn foreground_config() -> CoordinatorConfig {
    CoordinatorConfig::new()
        .with_monitor_enabled(false)
        .with_try_timeout(Duration::from_secs(1))
        .with_retry(fast_retry())
}

/// Poll the store until the transaction reaches `expected` or the budget
/// runs out.
async fn wait_for_status(store: &InMemoryTxStore, tx_id: tcc_engine_core::TxId, expected: TxStatus) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let tx = store.get_tx(tx_id).await.unwrap();
        if tx.status == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "transaction {tx_id} stuck in {:?}, expected {expected:?}",
            tx.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn s1_happy_path_two_participants() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );
    let a = Arc::new(ScriptedParticipant::ok("a"));
    let b = Arc::new(ScriptedParticipant::ok("b"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    let outcome = manager.start_transaction().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.verdict, TryVerdict::Ok);

    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Successful);
    assert!(
        tx.participant_statuses
            .values()
            .all(|e| e.try_status == TryStatus::Successful)
    );

    assert_eq!(a.confirm_count(), 1);
    assert_eq!(b.confirm_count(), 1);
    assert_eq!(a.cancel_count(), 0);
    assert_eq!(b.cancel_count(), 0);
    assert_eq!(store.submit_calls_for(outcome.tx_id), vec![true]);
}

#[tokio::test]
async fn s2_one_try_rejection_cancels_everyone() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );
    let a = Arc::new(ScriptedParticipant::ok("a"));
    let b = Arc::new(ScriptedParticipant::ok("b").with_try_rejection("insufficient funds"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    let outcome = manager.start_transaction().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.verdict, TryVerdict::BusinessFailure);

    wait_for_status(&store, outcome.tx_id, TxStatus::Failure).await;
    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(
        tx.entry(&ParticipantId::from("b")).unwrap().try_status,
        TryStatus::Failure
    );

    assert_eq!(a.cancel_count(), 1);
    assert_eq!(b.cancel_count(), 1);
    assert_eq!(a.confirm_count(), 0);
    assert_eq!(b.confirm_count(), 0);
    assert_eq!(store.submit_calls_for(outcome.tx_id), vec![false]);
}

#[tokio::test]
async fn s3_try_timeout_cancels_in_flight_participant() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let config = foreground_config().with_try_timeout(Duration::from_millis(50));
    let manager = TxManager::new(config, Arc::clone(&store), Arc::new(InProcessMetrics::new()));
    let a = Arc::new(ScriptedParticipant::ok("a").with_try_delay(Duration::from_millis(400)));
    let b = Arc::new(ScriptedParticipant::ok("b"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    let started = Instant::now();
    let outcome = manager.start_transaction().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.verdict, TryVerdict::Timeout);
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "start_transaction blocked past the deadline"
    );

    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Failure);
    // The unobserved participant was force-failed; its in-flight Try is
    // abandoned, not cancelled.
    assert_eq!(
        tx.entry(&ParticipantId::from("a")).unwrap().try_status,
        TryStatus::Failure
    );

    // Cancel reaches the slow participant even though its Try is still
    // running.
    assert_eq!(a.cancel_count(), 1);
    assert_eq!(b.cancel_count(), 1);
    assert_eq!(a.confirm_count() + b.confirm_count(), 0);
}

#[tokio::test]
async fn s4_transient_confirm_failures_then_success() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let metrics = Arc::new(InProcessMetrics::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        metrics.clone(),
    );
    let a = Arc::new(ScriptedParticipant::ok("a").with_confirm_failures(2));
    let b = Arc::new(ScriptedParticipant::ok("b"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    let outcome = manager.start_transaction().await.unwrap();

    assert!(outcome.success);
    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Successful);

    // Two transient failures, then success.
    assert_eq!(a.confirm_count(), 3);
    assert_eq!(store.submit_calls_for(outcome.tx_id), vec![true]);
    assert!(metrics.snapshot().participant_retries >= 2);
}

#[tokio::test]
async fn s5_monitor_recovers_transaction_after_crash() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let a_id = ParticipantId::from("a");
    let b_id = ParticipantId::from("b");

    // Simulate a coordinator that crashed between a fully successful Try
    // phase and submit: all entries recorded, no terminal status.
    let tx_id = store.create_tx(&[a_id.clone(), b_id.clone()]).await.unwrap();
    store.update_try_status(tx_id, &a_id, true).await.unwrap();
    store.update_try_status(tx_id, &b_id, true).await.unwrap();

    let config = CoordinatorConfig::new()
        .with_monitor_interval(Duration::from_millis(30))
        .with_retry(fast_retry());
    let manager = TxManager::new(config, Arc::clone(&store), Arc::new(InProcessMetrics::new()));
    let a = Arc::new(ScriptedParticipant::ok("a"));
    let b = Arc::new(ScriptedParticipant::ok("b"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    wait_for_status(&store, tx_id, TxStatus::Successful).await;

    assert_eq!(a.confirm_count(), 1);
    assert_eq!(b.confirm_count(), 1);
    assert_eq!(store.submit_calls_for(tx_id), vec![true]);

    manager.stop().await;
}

#[tokio::test]
async fn s6_duplicate_registration_is_rejected() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        store,
        Arc::new(InProcessMetrics::new()),
    );

    manager
        .register(Arc::new(ScriptedParticipant::ok("x")))
        .unwrap();
    let err = manager
        .register(Arc::new(ScriptedParticipant::ok("x")))
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::DuplicateParticipant(_)));
    assert_eq!(manager.health().participants_count, 1);
}

#[tokio::test]
async fn zero_timeout_fails_immediately_and_cancels() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );
    let a = Arc::new(ScriptedParticipant::ok("a").with_try_delay(Duration::from_millis(20)));
    manager.register(a.clone()).unwrap();

    let outcome = manager
        .start_transaction_with(StartOptions {
            timeout: Some(Duration::ZERO),
            metadata: None,
        })
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.verdict, TryVerdict::Timeout);

    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Failure);
    assert_eq!(a.cancel_count(), 1);
}

#[tokio::test]
async fn empty_registry_is_a_terminal_error() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );

    let err = manager.start_transaction().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NoParticipantsRegistered));
    assert_eq!(store.tx_count(), 0);
}

#[tokio::test]
async fn permanent_confirm_failure_leaves_transaction_hanging() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let config = foreground_config().with_retry(fast_retry().with_max_retries(2));
    let manager = TxManager::new(config, Arc::clone(&store), Arc::new(InProcessMetrics::new()));
    let a = Arc::new(ScriptedParticipant::ok("a").with_permanent_confirm_failure());
    let b = Arc::new(ScriptedParticipant::ok("b"));
    manager.register(a.clone()).unwrap();
    manager.register(b.clone()).unwrap();

    let outcome = manager.start_transaction().await.unwrap();

    // The Try phase itself succeeded.
    assert!(outcome.success);

    // Submit must never happen while a confirm is unresolved; the
    // transaction stays hanging for the monitor.
    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Hanging);
    assert!(store.submit_calls_for(outcome.tx_id).is_empty());
    // Initial attempt plus two retries.
    assert_eq!(a.confirm_count(), 3);

    // A later advancement retries the confirm rather than giving up.
    let err = manager.advance_by_id(outcome.tx_id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::RetriesExhausted { .. }));
    assert_eq!(a.confirm_count(), 6);
}

#[tokio::test]
async fn advancement_is_idempotent_on_terminal_transactions() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );
    let a = Arc::new(ScriptedParticipant::ok("a"));
    manager.register(a.clone()).unwrap();

    let outcome = manager.start_transaction().await.unwrap();
    assert!(outcome.success);

    for _ in 0..3 {
        manager.advance_by_id(outcome.tx_id).await.unwrap();
    }

    // No re-delivery and no re-submit once terminal.
    assert_eq!(a.confirm_count(), 1);
    assert_eq!(store.submit_calls_for(outcome.tx_id), vec![true]);
    let tx = store.get_tx(outcome.tx_id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Successful);
}

#[tokio::test]
async fn concurrent_monitors_are_serialized_by_the_advisory_lock() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let a_id = ParticipantId::from("a");

    let tx_id = store.create_tx(&[a_id.clone()]).await.unwrap();
    store.update_try_status(tx_id, &a_id, true).await.unwrap();

    let config = CoordinatorConfig::new()
        .with_monitor_interval(Duration::from_millis(25))
        .with_retry(fast_retry());
    let first = TxManager::new(
        config.clone(),
        Arc::clone(&store),
        Arc::new(InProcessMetrics::new()),
    );
    let second = TxManager::new(config, Arc::clone(&store), Arc::new(InProcessMetrics::new()));
    let a1 = Arc::new(ScriptedParticipant::ok("a"));
    let a2 = Arc::new(ScriptedParticipant::ok("a"));
    first.register(a1.clone()).unwrap();
    second.register(a2.clone()).unwrap();

    wait_for_status(&store, tx_id, TxStatus::Successful).await;

    // Ticks never overlapped across instances.
    assert_eq!(store.max_lock_holders(), 1);
    // Exactly one instance drove the transaction home per tick; the store
    // accepted a single effective submit value.
    assert!(store.submit_calls_for(tx_id).iter().all(|s| *s));
    assert!(a1.confirm_count() + a2.confirm_count() >= 1);

    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn health_reflects_registry_and_lifecycle() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let manager = TxManager::new(
        foreground_config(),
        store,
        Arc::new(InProcessMetrics::new()),
    );
    manager
        .register(Arc::new(ScriptedParticipant::ok("a")))
        .unwrap();

    let health = manager.health();
    assert!(health.healthy);
    assert!(health.instance_id.starts_with("tcc-"));
    assert_eq!(health.participants_count, 1);
    assert!(!health.monitor_enabled);

    manager.stop().await;
    assert!(!manager.health().healthy);
}

#[tokio::test]
async fn started_metric_counts_every_transaction() {
    init_tracing();
    let store = Arc::new(InMemoryTxStore::new());
    let metrics = Arc::new(InProcessMetrics::new());
    let manager = TxManager::new(foreground_config(), store, metrics.clone());
    manager
        .register(Arc::new(ScriptedParticipant::ok("a")))
        .unwrap();

    manager.start_transaction().await.unwrap();
    manager.start_transaction().await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.transactions_started, 2);
    assert_eq!(snapshot.transactions_confirmed, 2);
    assert_eq!(snapshot.transactions_cancelled, 0);
}
