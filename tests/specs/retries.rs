// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker retry specs: transient failures, exhaustion, permanent errors.

use super::prelude::*;
use vigil_core::Outcome;
use vigil_wire::decode_response;

#[tokio::test(start_paused = true)]
async fn transient_failures_then_success_complete_with_retry_count() {
    let pipeline = Pipeline::new();
    pipeline.api_detector.push_transient("503 from siem");
    pipeline.api_detector.push_transient("503 from siem");
    // Third call succeeds via the fake's default verdict.

    pipeline.run_to_completion(&RecordBuilder::new().build()).await;

    assert_eq!(pipeline.api_detector.calls(), 3);
    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Completed);
    assert_eq!(detections[0].retry_count, 2);

    // Exactly one response row despite the retries.
    let results = pipeline.store.detection_results_for(detections[0].id).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_with_one_error_response() {
    let pipeline = Pipeline::new();
    for _ in 0..4 {
        pipeline.api_detector.push_transient("connection refused");
    }

    assert_eq!(pipeline.ingest(&RecordBuilder::new().build()).await, Disposition::Ack);
    for disposition in pipeline.run_workers().await {
        assert_eq!(disposition, Disposition::Ack);
    }

    // DEFAULT_MAX_RETRIES = 3: four calls total, then one error response.
    assert_eq!(pipeline.api_detector.calls(), 4);
    let responses = pipeline.take_published();
    assert_eq!(responses.len(), 1);
    let response = decode_response(&responses[0].1).unwrap();
    assert_eq!(response.outcome, Outcome::Error);
    assert_eq!(response.detected, Detected::Unknown);

    assert_eq!(pipeline.results.handle(&responses[0].1).await, Disposition::Ack);

    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Failed);
    assert_eq!(detections[0].retry_count, 3);

    // The failure is audit-visible with structured diagnostics.
    let results = pipeline.store.detection_results_for(detections[0].id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata["outcome"], serde_json::json!("error"));
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_reports_without_retrying() {
    let pipeline = Pipeline::new();
    pipeline.api_detector.push_permanent("400 bad query");

    pipeline.run_to_completion(&RecordBuilder::new().build()).await;

    assert_eq!(pipeline.api_detector.calls(), 1);
    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Failed);
    assert_eq!(detections[0].retry_count, 0);
}
