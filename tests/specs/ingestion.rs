// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingestion idempotence and boundary specs.

use super::prelude::*;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn duplicate_ingestion_leaves_counts_unchanged() {
    let pipeline = Pipeline::new();
    let record = RecordBuilder::new();
    let payload = record.build();

    pipeline.run_to_completion(&payload).await;
    let counts = pipeline.store.counts();

    // The broker redelivers the same instruction; it must ack without
    // creating rows, and the completed detection must not be re-planned.
    assert_eq!(pipeline.ingest(&payload).await, Disposition::Ack);
    assert_eq!(pipeline.store.counts(), counts);
    assert!(pipeline.take_published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_ingestion_mid_flight_creates_no_extra_tasks_rows() {
    let pipeline = Pipeline::new();
    let payload = RecordBuilder::new().build();

    assert_eq!(pipeline.ingest(&payload).await, Disposition::Ack);
    assert_eq!(pipeline.take_published().len(), 1);

    // Redelivered while the task is still pending: the row set must not
    // grow. The pending task is re-offered; workers absorb the duplicate.
    assert_eq!(pipeline.ingest(&payload).await, Disposition::Ack);
    assert_eq!(pipeline.store.counts(), (1, 1, 1, 0));
    assert_eq!(pipeline.take_published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_detections_ack_without_tasks() {
    let pipeline = Pipeline::new();
    let record = RecordBuilder::new().detections(json!({}));

    assert_eq!(pipeline.ingest(&record.build()).await, Disposition::Ack);

    assert_eq!(pipeline.store.counts(), (1, 1, 0, 0));
    assert!(pipeline.take_published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn two_executions_share_one_operation() {
    let pipeline = Pipeline::new();
    let first = RecordBuilder::new();
    let operation_id = {
        // Both records reference the same upstream campaign.
        let payload = first.build();
        pipeline.run_to_completion(&payload).await;
        pipeline.store.executions_in_window(window()).await.unwrap()[0].operation_external_id
    };
    let second = RecordBuilder::new().operation_id(operation_id);
    pipeline.run_to_completion(&second.build()).await;

    let (operations, executions, detections, results) = pipeline.store.counts();
    assert_eq!(operations, 1);
    assert_eq!(executions, 2);
    assert_eq!(detections, 2);
    assert_eq!(results, 2);
}

fn window() -> vigil_store::TimeWindow {
    let now = chrono::Utc::now();
    vigil_store::TimeWindow { from: now - chrono::Duration::days(365), until: now + chrono::Duration::days(365) }
}

#[tokio::test(start_paused = true)]
async fn failed_link_state_still_fans_out() {
    // Records whose command failed upstream still get detection tasks
    // whenever detections are present.
    let pipeline = Pipeline::new();
    let mut record: serde_json::Value =
        serde_json::from_slice(&RecordBuilder::new().build()).unwrap();
    record["execution"]["link_state"] = json!("FAILED");
    record["execution"]["status"] = json!(1);

    pipeline.run_to_completion(&serde_json::to_vec(&record).unwrap()).await;
    assert_eq!(pipeline.store.counts(), (1, 1, 1, 1));
}
