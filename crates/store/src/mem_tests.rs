// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway contract tests, run against the in-memory implementation.

use super::*;
use chrono::Duration;
use serde_json::json;
use vigil_core::{Detected, DetectionType};

fn upsert(external_id: OperationId, name: &str, observed_at: DateTime<Utc>) -> OperationUpsert {
    OperationUpsert {
        external_id,
        name: name.into(),
        started_at: observed_at - Duration::minutes(5),
        metadata: json!({}),
        observed_at,
    }
}

fn new_execution(op: OperationId, link: LinkId) -> NewExecution {
    NewExecution {
        operation_external_id: op,
        link_id: link,
        agent_host: "ws-042".into(),
        agent_paw: "qwerty".into(),
        command: "whoami".into(),
        pid: 3110,
        status: 0,
        result_data: Default::default(),
        agent_reported_at: Utc::now(),
        link_state: "SUCCESS".into(),
        raw_message: json!({}),
    }
}

fn planned(ty: DetectionType, platform: &str) -> PlannedDetection {
    PlannedDetection {
        detection_type: ty,
        detection_platform: platform.into(),
        detection_config: json!({"q": platform}),
        max_retries: 2,
    }
}

fn result_for(id: DetectionExecutionId, detected: Detected) -> NewDetectionResult {
    NewDetectionResult {
        detection_execution_id: id,
        detected,
        raw_response: json!({"hits": 1}),
        parsed_results: json!([]),
        result_timestamp: Utc::now(),
        result_source: "siem.test".into(),
        metadata: json!({}),
    }
}

#[tokio::test]
async fn operation_upsert_is_idempotent() {
    let store = MemStore::new();
    let id = OperationId::new();
    let t0 = store.clock().now_utc();

    let first = store.upsert_operation(upsert(id, "alpha", t0)).await.unwrap();
    let second = store.upsert_operation(upsert(id, "alpha", t0)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(store.counts().0, 1);
}

#[tokio::test]
async fn operation_upsert_refreshes_only_newer_sightings() {
    let store = MemStore::new();
    let id = OperationId::new();
    let t0 = store.clock().now_utc();

    store.upsert_operation(upsert(id, "alpha", t0)).await.unwrap();

    // Older sighting: name must not regress.
    let stale = store
        .upsert_operation(upsert(id, "stale-name", t0 - Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(stale.name, "alpha");

    // Newer sighting wins.
    let fresh = store
        .upsert_operation(upsert(id, "alpha-renamed", t0 + Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(fresh.name, "alpha-renamed");
    assert_eq!(fresh.updated_at, t0 + Duration::minutes(1));
}

#[tokio::test]
async fn execution_create_is_idempotent_on_link_id() {
    let store = MemStore::new();
    let op = OperationId::new();
    let link = LinkId::new();

    let (first, created) = store.create_execution_if_absent(new_execution(op, link)).await.unwrap();
    assert!(created);

    let (second, created) =
        store.create_execution_if_absent(new_execution(op, link)).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(store.counts().1, 1);

    // Same link id under a different operation is a distinct execution.
    let (_, created) = store
        .create_execution_if_absent(new_execution(OperationId::new(), link))
        .await
        .unwrap();
    assert!(created);
}

async fn seeded_detection(store: &MemStore) -> DetectionExecutionRow {
    let outcome = store
        .ingest_execution(
            upsert(OperationId::new(), "alpha", store.clock().now_utc()),
            new_execution(OperationId::new(), LinkId::new()),
            vec![planned(DetectionType::Api, "siem")],
        )
        .await
        .unwrap();
    outcome.detections.into_iter().next().unwrap()
}

#[tokio::test]
async fn detection_executions_are_created_pending() {
    let store = MemStore::new();
    let op = OperationId::new();
    let (execution, _) =
        store.create_execution_if_absent(new_execution(op, LinkId::new())).await.unwrap();

    let row = store
        .create_detection_execution(NewDetectionExecution {
            execution_id: execution.id,
            operation_external_id: op,
            detection_type: DetectionType::Windows,
            detection_platform: "psh".into(),
            detection_config: json!({"script": "Get-WinEvent"}),
            max_retries: 2,
        })
        .await
        .unwrap();

    assert_eq!(row.status, DetectionStatus::Pending);
    assert_eq!(row.retry_count, 0);
    assert_eq!(row.max_retries, 2);
    assert!(row.started_at.is_none());
    assert!(row.completed_at.is_none());

    // Referencing a missing execution violates the foreign key.
    let err = store
        .create_detection_execution(NewDetectionExecution {
            execution_id: ExecutionId::new(),
            operation_external_id: op,
            detection_type: DetectionType::Api,
            detection_platform: "siem".into(),
            detection_config: json!({}),
            max_retries: 2,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[tokio::test]
async fn cas_transition_happy_path() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;
    let now = store.clock().now_utc();

    let running = store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Pending, DetectionStatus::Running],
            DetectionStatus::Running,
            TransitionPatch::started(now),
        )
        .await
        .unwrap();
    assert_eq!(running.status, DetectionStatus::Running);
    assert_eq!(running.started_at, Some(now));
    assert_eq!(running.completed_at, None);
}

#[tokio::test]
async fn cas_transition_conflict_reports_actual_state() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;
    let now = store.clock().now_utc();

    store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Pending],
            DetectionStatus::Cancelled,
            TransitionPatch::completed(now),
        )
        .await
        .unwrap();

    let err = store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Pending],
            DetectionStatus::Running,
            TransitionPatch::default(),
        )
        .await
        .unwrap_err();
    match err {
        StoreError::Conflict { actual, .. } => assert_eq!(actual, DetectionStatus::Cancelled),
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn cas_transition_unknown_row_is_not_found() {
    let store = MemStore::new();
    let err = store
        .transition_detection_execution(
            DetectionExecutionId::new(),
            &[DetectionStatus::Pending],
            DetectionStatus::Running,
            TransitionPatch::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn started_at_is_write_once() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;
    let t0 = store.clock().now_utc();

    store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Pending],
            DetectionStatus::Running,
            TransitionPatch::started(t0),
        )
        .await
        .unwrap();

    // A later redelivery attempts to stamp a new start; the original sticks.
    let later = t0 + Duration::seconds(30);
    let row = store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Running],
            DetectionStatus::Running,
            TransitionPatch::started(later),
        )
        .await
        .unwrap();
    assert_eq!(row.started_at, Some(t0));
}

#[tokio::test]
async fn retry_count_cannot_exceed_max_retries() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;

    let err = store
        .transition_detection_execution(
            det.id,
            &[DetectionStatus::Pending],
            DetectionStatus::Running,
            TransitionPatch::retry(det.max_retries + 1, json!({})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[tokio::test]
async fn ingest_replay_leaves_counts_unchanged() {
    let store = MemStore::new();
    let op = OperationId::new();
    let link = LinkId::new();
    let now = store.clock().now_utc();
    let plan =
        vec![planned(DetectionType::Api, "siem"), planned(DetectionType::Linux, "sh")];

    let first = store
        .ingest_execution(upsert(op, "alpha", now), new_execution(op, link), plan.clone())
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.detections.len(), 2);

    let replay = store
        .ingest_execution(upsert(op, "alpha", now), new_execution(op, link), plan)
        .await
        .unwrap();
    assert!(!replay.created);
    // Replay re-offers the still-pending rows, without creating new ones.
    assert_eq!(replay.detections.len(), 2);
    assert_eq!(store.counts(), (1, 1, 2, 0));
}

#[tokio::test]
async fn ingest_replay_skips_rows_no_longer_pending() {
    let store = MemStore::new();
    let op = OperationId::new();
    let link = LinkId::new();
    let now = store.clock().now_utc();
    let plan =
        vec![planned(DetectionType::Api, "siem"), planned(DetectionType::Linux, "sh")];

    let first = store
        .ingest_execution(upsert(op, "alpha", now), new_execution(op, link), plan.clone())
        .await
        .unwrap();

    // One of the two rows has already been picked up by a worker.
    store
        .transition_detection_execution(
            first.detections[0].id,
            &[DetectionStatus::Pending],
            DetectionStatus::Running,
            TransitionPatch::started(now),
        )
        .await
        .unwrap();

    let replay = store
        .ingest_execution(upsert(op, "alpha", now), new_execution(op, link), plan)
        .await
        .unwrap();
    assert_eq!(replay.detections.len(), 1);
    assert_eq!(replay.detections[0].id, first.detections[1].id);
}

#[tokio::test]
async fn record_response_transitions_and_appends() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;
    let now = store.clock().now_utc();

    let outcome = store
        .record_response(result_for(det.id, Detected::Yes), DetectionStatus::Completed, now)
        .await
        .unwrap();

    assert!(outcome.transitioned);
    assert_eq!(outcome.detection_execution.status, DetectionStatus::Completed);
    assert_eq!(outcome.detection_execution.completed_at, Some(now));
    assert_eq!(outcome.result.detected, Detected::Yes);
    assert_eq!(store.detection_results_for(det.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_response_appends_without_changing_status() {
    let store = MemStore::new();
    let det = seeded_detection(&store).await;
    let now = store.clock().now_utc();

    store
        .record_response(result_for(det.id, Detected::Yes), DetectionStatus::Completed, now)
        .await
        .unwrap();
    let dup = store
        .record_response(result_for(det.id, Detected::Yes), DetectionStatus::Failed, now)
        .await
        .unwrap();

    assert!(!dup.transitioned);
    // Terminal status is sticky even though the duplicate asked for failed.
    assert_eq!(dup.detection_execution.status, DetectionStatus::Completed);
    // Both result rows are audit-visible.
    assert_eq!(store.detection_results_for(det.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn record_response_unknown_correlation_is_not_found() {
    let store = MemStore::new();
    let err = store
        .record_response(
            result_for(DetectionExecutionId::new(), Detected::Unknown),
            DetectionStatus::Completed,
            store.clock().now_utc(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    // Nothing appended for the unknown id.
    assert_eq!(store.counts().3, 0);
}

#[tokio::test]
async fn append_requires_existing_detection_execution() {
    let store = MemStore::new();
    let err = store
        .append_detection_result(result_for(DetectionExecutionId::new(), Detected::No))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[tokio::test]
async fn query_helpers_filter_and_order() {
    let store = MemStore::new();
    let op = OperationId::new();
    let now = store.clock().now_utc();
    let plan = vec![
        planned(DetectionType::Windows, "psh"),
        planned(DetectionType::Api, "siem"),
        planned(DetectionType::Api, "edr"),
    ];
    let outcome = store
        .ingest_execution(upsert(op, "alpha", now), new_execution(op, LinkId::new()), plan)
        .await
        .unwrap();

    let by_execution =
        store.detection_executions_for_execution(outcome.execution.id).await.unwrap();
    let keys: Vec<(DetectionType, &str)> = by_execution
        .iter()
        .map(|d| (d.detection_type, d.detection_platform.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![
            (DetectionType::Api, "edr"),
            (DetectionType::Api, "siem"),
            (DetectionType::Windows, "psh"),
        ]
    );

    let pending =
        store.detection_executions_by_status(DetectionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 3);

    let window = TimeWindow { from: now - Duration::hours(1), until: now + Duration::hours(1) };
    assert_eq!(store.executions_in_window(window).await.unwrap().len(), 1);
    let empty = TimeWindow { from: now + Duration::hours(1), until: now + Duration::hours(2) };
    assert!(store.executions_in_window(empty).await.unwrap().is_empty());
}
