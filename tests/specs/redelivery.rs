// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash and redelivery specs: the at-least-once contract end to end.

use super::prelude::*;

#[tokio::test(start_paused = true)]
async fn crash_after_response_publish_before_task_ack() {
    let pipeline = Pipeline::new();
    assert_eq!(pipeline.ingest(&RecordBuilder::new().build()).await, Disposition::Ack);

    // Worker runs the task and publishes its response, but "dies" before
    // acking, so the broker will redeliver the same task later.
    let tasks = pipeline.take_published();
    assert_eq!(tasks.len(), 1);
    let task_payload = tasks[0].1.clone();
    assert_eq!(pipeline.api_worker.handle(&task_payload).await, Disposition::Ack);

    // The response reaches the result consumer: row goes terminal.
    let responses = pipeline.take_published();
    assert_eq!(responses.len(), 1);
    let response_payload = responses[0].1.clone();
    assert_eq!(pipeline.results.handle(&response_payload).await, Disposition::Ack);
    assert_eq!(pipeline.api_detector.calls(), 1);

    // Redelivered task: the replacement worker observes the terminal row
    // via CAS, skips the detector, publishes nothing, and acks.
    assert_eq!(pipeline.api_worker.handle(&task_payload).await, Disposition::Ack);
    assert_eq!(pipeline.api_detector.calls(), 1);
    assert!(pipeline.take_published().is_empty());

    // A second identical response is a no-op on status, but the duplicate
    // result row stays visible for audit.
    assert_eq!(pipeline.results.handle(&response_payload).await, Disposition::Ack);
    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Completed);
    assert_eq!(
        pipeline.store.detection_results_for(detections[0].id).await.unwrap().len(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn task_redelivery_mid_flight_matches_no_disconnect_end_state() {
    // A disconnect before the task ack redelivers the task; the end state
    // must equal the no-disconnect run.
    let baseline = Pipeline::new();
    baseline.run_to_completion(&RecordBuilder::new().build()).await;
    let baseline_detections = baseline.detections().await;

    let pipeline = Pipeline::new();
    assert_eq!(pipeline.ingest(&RecordBuilder::new().build()).await, Disposition::Ack);
    let tasks = pipeline.take_published();
    let task_payload = tasks[0].1.clone();

    // First delivery completes but its ack is "lost"; the broker hands
    // the task out again before the response arrives.
    assert_eq!(pipeline.api_worker.handle(&task_payload).await, Disposition::Ack);
    assert_eq!(pipeline.api_worker.handle(&task_payload).await, Disposition::Ack);

    // Both responses land; the first wins, the second appends only.
    for disposition in pipeline.run_results().await {
        assert_eq!(disposition, Disposition::Ack);
    }

    let detections = pipeline.detections().await;
    assert_eq!(detections.len(), baseline_detections.len());
    assert_eq!(detections[0].status, DetectionStatus::Completed);
    assert_eq!(detections[0].status, baseline_detections[0].status);

    // Counts match except for the audit-visible duplicate result row.
    assert_eq!(pipeline.store.counts().0, baseline.store.counts().0);
    assert_eq!(pipeline.store.counts().1, baseline.store.counts().1);
    assert_eq!(pipeline.store.counts().2, baseline.store.counts().2);
}

#[tokio::test(start_paused = true)]
async fn instruction_redelivery_after_dispatch_crash_strands_nothing() {
    let pipeline = Pipeline::new();
    let payload = RecordBuilder::new().build();

    // The dispatch publish fails after the rows committed; the handler
    // requeues the instruction instead of acking.
    pipeline.bus.fail_next(1);
    assert_eq!(pipeline.ingest(&payload).await, Disposition::Requeue);
    assert_eq!(pipeline.store.counts(), (1, 1, 1, 0));
    assert!(pipeline.take_published().is_empty());

    // Redelivery publishes the still-pending task and the pipeline
    // finishes normally.
    assert_eq!(pipeline.ingest(&payload).await, Disposition::Ack);
    for disposition in pipeline.run_workers().await {
        assert_eq!(disposition, Disposition::Ack);
    }
    for disposition in pipeline.run_results().await {
        assert_eq!(disposition, Disposition::Ack);
    }
    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn second_worker_run_mid_retry_is_absorbed() {
    // Redelivery while the row sits in running with retries left: the
    // second delivery re-claims (running → running) and finishes.
    let pipeline = Pipeline::new();
    pipeline.api_detector.push_transient("flaky");
    assert_eq!(pipeline.ingest(&RecordBuilder::new().build()).await, Disposition::Ack);

    let tasks = pipeline.take_published();
    assert_eq!(pipeline.api_worker.handle(&tasks[0].1).await, Disposition::Ack);

    let detections = pipeline.detections().await;
    assert_eq!(detections[0].retry_count, 1);

    for disposition in pipeline.run_results().await {
        assert_eq!(disposition, Disposition::Ack);
    }
    assert_eq!(pipeline.detections().await[0].status, DetectionStatus::Completed);
}
