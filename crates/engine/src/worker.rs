// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker runtime: generic base for detection workers.
//!
//! Consumes a typed task queue, claims the row via CAS, applies jitter,
//! invokes a platform detector under a timeout, retries transient
//! failures up to the task's budget, and publishes one standardized
//! detection response before acking. The worker never writes detection
//! results; it mutates only its own detection_execution row.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use vigil_broker::{Disposition, Handler, Publisher};
use vigil_core::{Clock, Detected, DetectionStatus, Outcome, TransitionPatch};
use vigil_store::{StoreError, StoreGateway};
use vigil_wire::{decode_task, encode_response, DetectionResponse, DetectionTask};

/// Detector failure modes. Transient failures are retried in-process;
/// permanent ones (a 4xx, an unusable config) are reported immediately.
#[derive(Debug, Clone, Error)]
pub enum DetectError {
    #[error("transient detector failure: {0}")]
    Transient(String),
    #[error("permanent detector failure: {0}")]
    Permanent(String),
}

/// What a detector saw.
#[derive(Debug, Clone)]
pub struct Observation {
    pub detected: Detected,
    pub raw_response: Value,
    pub parsed_results: Value,
    pub source: String,
}

/// Platform-specific detection back-end (SIEM API, EDR API, host shell).
/// Implementations live outside this crate; the runtime only needs this
/// contract.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Back-end identity reported when a detection fails before any
    /// observation exists.
    fn source(&self) -> &str;

    async fn detect(&self, task: &DetectionTask) -> Result<Observation, DetectError>;
}

/// Per-worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Uniform random delay before the first detector call.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Delay between transient-failure retries.
    pub retry_delay: Duration,
    /// Budget for one detector call.
    pub detector_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            detector_timeout: Duration::from_secs(30),
        }
    }
}

/// One worker pool's handler.
pub struct Worker<C: Clock> {
    detector: Arc<dyn Detector>,
    store: Arc<dyn StoreGateway>,
    publisher: Arc<dyn Publisher>,
    config: WorkerConfig,
    clock: C,
}

impl<C: Clock> Worker<C> {
    pub fn new(
        detector: Arc<dyn Detector>,
        store: Arc<dyn StoreGateway>,
        publisher: Arc<dyn Publisher>,
        config: WorkerConfig,
        clock: C,
    ) -> Self {
        Self { detector, store, publisher, config, clock }
    }

    async fn jitter_sleep(&self) {
        let min = self.config.jitter_min.as_millis() as u64;
        let max = self.config.jitter_max.as_millis() as u64;
        let delay = if max > min { rand::thread_rng().gen_range(min..=max) } else { min };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Persist a retry-count bump on the claimed row. Returns a
    /// disposition when processing cannot continue.
    async fn persist_retry(
        &self,
        task: &DetectionTask,
        retries: i32,
        last_error: &str,
    ) -> Option<Disposition> {
        let patch = TransitionPatch::retry(
            retries,
            json!({ "last_error": last_error, "worker_id": self.config.worker_id }),
        );
        match self
            .store
            .transition_detection_execution(
                task.detection_execution_id,
                &[DetectionStatus::Running],
                DetectionStatus::Running,
                patch,
            )
            .await
        {
            Ok(_) => None,
            Err(StoreError::Conflict { actual, .. }) if actual.is_terminal() => {
                // Someone else finished this row while we were retrying.
                info!(task_id = %task.task_id, status = %actual, "row already terminal, dropping task");
                Some(Disposition::Ack)
            }
            Err(e) if e.is_transient() => {
                warn!(task_id = %task.task_id, error = %e, "retry bookkeeping failed, requeueing");
                Some(Disposition::Requeue)
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "retry bookkeeping rejected");
                Some(Disposition::DeadLetter { tag: "constraint", detail: e.to_string() })
            }
        }
    }

    /// Run the detector with the retry loop. Returns the final outcome,
    /// the observation (if any), the error text (if any), and the retry
    /// count reached, or a short-circuit disposition.
    async fn detect_with_retries(
        &self,
        task: &DetectionTask,
        mut retries: i32,
    ) -> Result<(Outcome, Option<Observation>, Option<String>, i32), Disposition> {
        loop {
            let verdict =
                tokio::time::timeout(self.config.detector_timeout, self.detector.detect(task))
                    .await;

            let (timed_out, error) = match verdict {
                Ok(Ok(observation)) => return Ok((Outcome::Ok, Some(observation), None, retries)),
                Ok(Err(DetectError::Permanent(msg))) => {
                    return Ok((Outcome::Error, None, Some(msg), retries));
                }
                Ok(Err(DetectError::Transient(msg))) => (false, msg),
                Err(_) => (
                    true,
                    format!(
                        "detector timed out after {}ms",
                        self.config.detector_timeout.as_millis()
                    ),
                ),
            };

            if retries < task.max_retries {
                retries += 1;
                warn!(
                    task_id = %task.task_id,
                    attempt = retries,
                    max_retries = task.max_retries,
                    error = %error,
                    "transient detector failure, retrying"
                );
                if let Some(disposition) = self.persist_retry(task, retries, &error).await {
                    return Err(disposition);
                }
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }

            let outcome = if timed_out { Outcome::Timeout } else { Outcome::Error };
            return Ok((outcome, None, Some(error), retries));
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Handler for Worker<C> {
    fn name(&self) -> &str {
        &self.config.worker_id
    }

    async fn handle(&self, payload: &[u8]) -> Disposition {
        let task = match decode_task(payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "rejecting malformed task");
                return Disposition::DeadLetter { tag: "malformed", detail: e.to_string() };
            }
        };

        // Claim the row. Accepting running → running lets a redelivered
        // task finish after a crash between claim and response.
        let row = match self
            .store
            .transition_detection_execution(
                task.detection_execution_id,
                &[DetectionStatus::Pending, DetectionStatus::Running],
                DetectionStatus::Running,
                TransitionPatch::started(self.clock.now_utc()),
            )
            .await
        {
            Ok(row) => row,
            Err(StoreError::Conflict { actual, .. }) if actual.is_terminal() => {
                info!(
                    task_id = %task.task_id,
                    detection_execution_id = %task.detection_execution_id,
                    status = %actual,
                    "task already finished, acking duplicate delivery"
                );
                return Disposition::Ack;
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(task_id = %task.task_id, "task with unknown correlation");
                return Disposition::DeadLetter {
                    tag: "unknown-correlation",
                    detail: format!("no detection execution {}", task.detection_execution_id),
                };
            }
            Err(e) if e.is_transient() => return Disposition::Requeue,
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "claim rejected");
                return Disposition::DeadLetter { tag: "constraint", detail: e.to_string() };
            }
        };

        self.jitter_sleep().await;

        let (outcome, observation, error, retries) =
            match self.detect_with_retries(&task, row.retry_count).await {
                Ok(result) => result,
                Err(disposition) => return disposition,
            };

        let (detected, raw_response, parsed_results, source) = match observation {
            Some(o) => (o.detected, o.raw_response, o.parsed_results, o.source),
            None => (Detected::Unknown, Value::Null, Value::Null, self.detector.source().into()),
        };
        let response = DetectionResponse {
            task_id: task.task_id,
            detection_execution_id: task.detection_execution_id,
            outcome,
            detected,
            raw_response,
            parsed_results,
            source,
            worker_id: self.config.worker_id.clone(),
            finished_at: self.clock.now_utc(),
            metadata: json!({ "retry_count": retries, "error": error }),
        };

        let payload = match encode_response(&response) {
            Ok(payload) => payload,
            Err(e) => {
                // Construction bug; requeue and let the poison threshold
                // cap the loop.
                warn!(task_id = %task.task_id, error = %e, "response encode failed");
                return Disposition::Requeue;
            }
        };
        if let Err(e) = self.publisher.publish(task.response_routing_key(), &payload).await {
            warn!(task_id = %task.task_id, error = %e, "response publish failed, requeueing");
            return Disposition::Requeue;
        }

        info!(
            task_id = %task.task_id,
            detection_execution_id = %task.detection_execution_id,
            outcome = %outcome,
            detected = %response.detected,
            retries,
            "task finished"
        );
        Disposition::Ack
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDetector;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    enum Verdict {
        Ok(Observation),
        Transient(String),
        Permanent(String),
        /// Sleeps past any plausible detector timeout.
        Hang,
    }

    /// Scripted detector for tests. With an empty script every call
    /// observes `detected = true`.
    pub struct FakeDetector {
        source: String,
        script: Mutex<VecDeque<Verdict>>,
        calls: Mutex<u32>,
    }

    impl FakeDetector {
        pub fn new(source: impl Into<String>) -> Self {
            Self { source: source.into(), script: Mutex::new(VecDeque::new()), calls: Mutex::new(0) }
        }

        pub fn push_detected(&self, detected: Detected) {
            self.script.lock().push_back(Verdict::Ok(Observation {
                detected,
                raw_response: json!({"fake": true}),
                parsed_results: json!([]),
                source: self.source.clone(),
            }));
        }

        pub fn push_transient(&self, msg: impl Into<String>) {
            self.script.lock().push_back(Verdict::Transient(msg.into()));
        }

        pub fn push_permanent(&self, msg: impl Into<String>) {
            self.script.lock().push_back(Verdict::Permanent(msg.into()));
        }

        pub fn push_hang(&self) {
            self.script.lock().push_back(Verdict::Hang);
        }

        pub fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Detector for FakeDetector {
        fn source(&self) -> &str {
            &self.source
        }

        async fn detect(&self, _task: &DetectionTask) -> Result<Observation, DetectError> {
            *self.calls.lock() += 1;
            let verdict = self.script.lock().pop_front();
            match verdict {
                None => Ok(Observation {
                    detected: Detected::Yes,
                    raw_response: json!({"fake": true}),
                    parsed_results: json!([]),
                    source: self.source.clone(),
                }),
                Some(Verdict::Ok(observation)) => Ok(observation),
                Some(Verdict::Transient(msg)) => Err(DetectError::Transient(msg)),
                Some(Verdict::Permanent(msg)) => Err(DetectError::Permanent(msg)),
                Some(Verdict::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(DetectError::Transient("woke from hang".into()))
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
