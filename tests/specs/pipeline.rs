// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path pipeline specs: one record in, detections out, results back.

use super::prelude::*;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn happy_path_api_detection() {
    let pipeline = Pipeline::new();
    let record = RecordBuilder::new();

    pipeline.run_to_completion(&record.build()).await;

    // Exactly one row per entity.
    assert_eq!(pipeline.store.counts(), (1, 1, 1, 1));

    let detections = pipeline.detections().await;
    assert_eq!(detections.len(), 1);
    let detection = &detections[0];
    assert_eq!(detection.detection_type, DetectionType::Api);
    assert_eq!(detection.detection_platform, "siem");
    assert_eq!(detection.status, DetectionStatus::Completed);
    assert_eq!(detection.retry_count, 0);
    assert!(detection.started_at.is_some());
    assert!(detection.completed_at >= detection.started_at);

    let results = pipeline.store.detection_results_for(detection.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].detected, Detected::Yes);
    assert_eq!(results[0].result_source, "siem.test");
}

#[tokio::test(start_paused = true)]
async fn mixed_platforms_fan_out_to_both_queues() {
    let pipeline = Pipeline::new();
    let record = RecordBuilder::new().detections(json!({
        "api": { "siem": { "query": "index=main" } },
        "windows": { "psh": { "script": "Get-WinEvent" } },
        "linux": { "sh": { "script": "ausearch -m EXECVE" } }
    }));

    assert_eq!(pipeline.ingest(&record.build()).await, Disposition::Ack);

    // One api task, two agent tasks.
    let published = pipeline.take_published();
    let mut routes: Vec<&str> = published.iter().map(|(r, _)| r.as_str()).collect();
    routes.sort_unstable();
    assert_eq!(routes, vec!["checking.agent.task", "checking.agent.task", "checking.api.task"]);

    // Deliver the tasks in reverse order; ordering is not guaranteed and
    // must not matter.
    for (route, payload) in published.into_iter().rev() {
        let disposition = match route.as_str() {
            "checking.api.task" => pipeline.api_worker.handle(&payload).await,
            _ => pipeline.agent_worker.handle(&payload).await,
        };
        assert_eq!(disposition, Disposition::Ack);
    }

    // Three responses arrive in any order; three results are appended.
    let mut responses = pipeline.take_published();
    responses.reverse();
    for (_, payload) in responses {
        assert_eq!(pipeline.results.handle(&payload).await, Disposition::Ack);
    }

    assert_eq!(pipeline.store.counts(), (1, 1, 3, 3));
    let detections = pipeline.detections().await;
    assert_eq!(detections.len(), 3);
    assert!(detections.iter().all(|d| d.status == DetectionStatus::Completed));
    for detection in &detections {
        let results = pipeline.store.detection_results_for(detection.id).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn detected_false_completes_with_negative_result() {
    let pipeline = Pipeline::new();
    pipeline.api_detector.push_detected(Detected::No);

    pipeline.run_to_completion(&RecordBuilder::new().build()).await;

    let detections = pipeline.detections().await;
    assert_eq!(detections[0].status, DetectionStatus::Completed);
    let results = pipeline.store.detection_results_for(detections[0].id).await.unwrap();
    assert_detected(&results, Detected::No);
}
