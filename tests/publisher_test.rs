//! Publisher delivery, queueing and circuit behaviour against in-memory doubles.

mod common;

use std::time::Duration;

use common::{capture_logs, HarnessOptions, RelayHarness};
use menu_events::constants::events;
use menu_events::resilience::CircuitState;
use menu_events::{FailureStore, PublishOutcome};
use serde_json::json;

#[tokio::test]
async fn test_healthy_broker_receives_event_in_call() {
    let harness = RelayHarness::new().await;

    let outcome = harness
        .publisher
        .publish(events::ITEM_ADDED, &json!({"id": "i1"}))
        .await;

    assert_eq!(outcome, PublishOutcome::Delivered);
    assert_eq!(harness.broker.count_for(events::ITEM_ADDED), 1);
    assert!(harness.primary.is_empty());
    assert!(harness.fallback.is_empty());
}

#[tokio::test]
async fn test_failing_broker_scenario_queues_then_replays_once() {
    let harness = RelayHarness::new().await;
    harness.broker.fail_next(3);

    let payload = json!({"id": "m1", "name": "Lunch"});
    let outcome = harness.publisher.publish(events::MENU_CREATED, &payload).await;

    assert!(matches!(outcome, PublishOutcome::Queued { tier: 0, .. }));
    assert_eq!(harness.broker.emit_attempts(), 3);
    assert_eq!(harness.broker.emitted_count(), 0);

    let record = harness.single_primary_record().await;
    assert_eq!(record.pattern, events::MENU_CREATED);
    assert_eq!(record.payload, payload);
    assert_eq!(record.retry_count, 0);
    assert!(!record.processed);
    assert!(record.last_error.is_some());

    let report = harness.scheduler.run_retry_pass().await;
    assert_eq!(report.delivered, 1);

    let record = harness.primary.get(&record.id).expect("record kept for audit");
    assert!(record.processed);
    assert!(harness.primary.list_unprocessed(10).await.unwrap().is_empty());

    // A second pass must not replay the processed record
    harness.scheduler.run_retry_pass().await;
    assert_eq!(harness.broker.count_for(events::MENU_CREATED), 1);
    assert_eq!(harness.broker.emitted()[0].payload, payload);
}

#[tokio::test]
async fn test_backoff_is_linear_between_attempts() {
    let harness = RelayHarness::new().await;
    harness.broker.fail_next(3);

    let started = std::time::Instant::now();
    harness.publisher.publish(events::MENU_UPDATED, &json!({})).await;

    // retry_delay_ms = 1: waits of 1ms then 2ms
    assert!(started.elapsed() >= Duration::from_millis(3));
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_and_closes_after_timeout() {
    let harness = RelayHarness::with_options(HarnessOptions {
        failure_threshold: 5,
        reset_timeout_ms: 50,
        ..Default::default()
    })
    .await;
    harness.broker.fail_next(5 * 3);

    for _ in 0..5 {
        let outcome = harness.publisher.publish(events::MENU_UPDATED, &json!({})).await;
        assert!(matches!(outcome, PublishOutcome::Queued { .. }));
    }
    assert_eq!(harness.publisher.circuit_state(), CircuitState::Open);
    assert_eq!(harness.broker.emit_attempts(), 15);

    // Open circuit: queued without touching the broker
    harness.publisher.publish(events::MENU_UPDATED, &json!({})).await;
    assert_eq!(harness.broker.emit_attempts(), 15);
    assert_eq!(harness.publisher.stats().short_circuited, 1);

    tokio::time::sleep(Duration::from_millis(70)).await;

    let outcome = harness.publisher.publish(events::MENU_UPDATED, &json!({})).await;
    assert_eq!(outcome, PublishOutcome::Delivered);
    assert_eq!(harness.publisher.circuit_state(), CircuitState::Closed);
    assert_eq!(harness.publisher.circuit_metrics().await.consecutive_failures, 0);
}

#[tokio::test]
async fn test_unready_broker_queues_without_attempts() {
    let harness = RelayHarness::with_options(HarnessOptions {
        broker_reachable_at_start: false,
        ..Default::default()
    })
    .await;

    let outcome = harness.publisher.publish(events::RESTAURANT_UPDATED, &json!({})).await;

    assert!(matches!(outcome, PublishOutcome::Queued { tier: 0, .. }));
    assert_eq!(harness.broker.emit_attempts(), 0);
    let record = harness.single_primary_record().await;
    assert!(record
        .last_error
        .map(|e| e.message.contains("not ready"))
        .unwrap_or(false));
}

#[tokio::test]
async fn test_primary_outage_falls_back_to_file_tier() {
    let harness = RelayHarness::new().await;
    harness.broker.set_available(false);
    harness.primary.set_available(false);

    let outcome = harness.publisher.publish(events::CATEGORY_REMOVED, &json!({"id": "c9"})).await;

    assert!(matches!(outcome, PublishOutcome::Queued { tier: 1, .. }));
    assert_eq!(harness.primary.save_calls(), 1);
    assert_eq!(harness.fallback.len(), 1);
    assert_eq!(harness.publisher.stats().queued_fallback, 1);
}

#[tokio::test]
async fn test_total_store_failure_logs_event_at_critical_severity() {
    let (logs, _guard) = capture_logs();
    let harness = RelayHarness::new().await;
    harness.broker.set_available(false);
    harness.primary.set_available(false);
    harness.fallback.set_available(false);

    let outcome = harness
        .publisher
        .publish(events::MENU_DELETED, &json!({"id": "m42"}))
        .await;

    assert_eq!(outcome, PublishOutcome::Lost);
    assert_eq!(harness.publisher.stats().lost, 1);

    let critical: Vec<_> = logs
        .lines()
        .into_iter()
        .filter(|line| line["fields"]["severity"] == "critical")
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0]["level"], "ERROR");
    assert_eq!(critical[0]["fields"]["pattern"], events::MENU_DELETED);
    let payload = critical[0]["fields"]["payload"].as_str().unwrap_or_default();
    assert!(payload.contains("m42"), "payload missing from log: {payload}");
    let tier_errors = critical[0]["fields"]["tier_errors"].as_str().unwrap_or_default();
    assert!(tier_errors.contains("offline"), "tier errors missing from log: {tier_errors}");
}
