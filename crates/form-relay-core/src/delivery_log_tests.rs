//! Tests for the delivery log and failure-window policy

use super::*;
use crate::adapters::MemoryDeliveryLogStore;
use crate::destination::{DestinationKind, DestinationRef};
use crate::DestinationId;
use serde_json::json;

fn webhook_ref() -> DestinationRef {
    DestinationRef {
        kind: DestinationKind::Webhook,
        id: DestinationId::new(),
    }
}

#[tokio::test]
async fn test_append_and_list_newest_first() {
    let store = MemoryDeliveryLogStore::new();
    let destination = webhook_ref();

    for i in 0..3 {
        store
            .append(DeliveryLog::success(
                destination,
                EventType::SubmissionCreated,
                json!({ "n": i }),
                Some(200),
            ))
            .await
            .unwrap();
    }

    let rows = store.list_for_destination(&destination, 10).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let limited = store.list_for_destination(&destination, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_failures_since_counts_only_failures_for_destination() {
    let store = MemoryDeliveryLogStore::new();
    let destination = webhook_ref();
    let other = webhook_ref();
    let window_start = Timestamp::now().subtract_duration(Duration::from_secs(3600));

    store
        .append(DeliveryLog::success(
            destination,
            EventType::SubmissionCreated,
            json!({}),
            Some(200),
        ))
        .await
        .unwrap();
    store
        .append(DeliveryLog::failure(
            destination,
            EventType::SubmissionCreated,
            json!({}),
            Some(500),
            "boom",
        ))
        .await
        .unwrap();
    store
        .append(DeliveryLog::failure(
            other,
            EventType::SubmissionCreated,
            json!({}),
            None,
            "other destination",
        ))
        .await
        .unwrap();

    let failures = store.failures_since(&destination, window_start).await.unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_policy_trips_at_threshold() {
    let store = MemoryDeliveryLogStore::new();
    let destination = webhook_ref();
    let policy = FailurePolicy::default();
    assert_eq!(policy.threshold, 10);

    for _ in 0..9 {
        store
            .append(DeliveryLog::failure(
                destination,
                EventType::SubmissionCreated,
                json!({}),
                Some(500),
                "boom",
            ))
            .await
            .unwrap();
    }
    assert!(!policy.is_tripped(&store, &destination).await.unwrap());

    store
        .append(DeliveryLog::failure(
            destination,
            EventType::SubmissionCreated,
            json!({}),
            Some(500),
            "boom",
        ))
        .await
        .unwrap();
    assert!(policy.is_tripped(&store, &destination).await.unwrap());
}

#[tokio::test]
async fn test_policy_ignores_successes() {
    let store = MemoryDeliveryLogStore::new();
    let destination = webhook_ref();
    let policy = FailurePolicy::new(2, Duration::from_secs(3600));

    for _ in 0..5 {
        store
            .append(DeliveryLog::success(
                destination,
                EventType::SubmissionCreated,
                json!({}),
                Some(200),
            ))
            .await
            .unwrap();
    }

    assert!(!policy.is_tripped(&store, &destination).await.unwrap());
}

#[test]
fn test_policy_window_start() {
    let policy = FailurePolicy::new(10, Duration::from_secs(24 * 3600));
    let now = Timestamp::now();
    let start = policy.window_start(now);
    assert_eq!(now.duration_since(start).as_secs(), 24 * 3600);
}

#[test]
fn test_log_row_shape() {
    let destination = webhook_ref();
    let success = DeliveryLog::success(
        destination,
        EventType::SubmissionCreated,
        json!({"k": "v"}),
        Some(201),
    );
    assert!(success.success);
    assert_eq!(success.status_code, Some(201));
    assert!(success.error.is_none());

    let failure = DeliveryLog::failure(
        destination,
        EventType::SubmissionCreated,
        json!({}),
        None,
        "connect timeout",
    );
    assert!(!failure.success);
    assert!(failure.status_code.is_none());
    assert_eq!(failure.error.as_deref(), Some("connect timeout"));
}
