// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result consumer: worker responses become result rows and terminal
//! status transitions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use vigil_broker::{Disposition, Handler};
use vigil_core::{Clock, NewDetectionResult};
use vigil_store::{StoreError, StoreGateway};
use vigil_wire::{decode_response, DetectionResponse};

/// Consumes both response queues.
///
/// One delivery is one transaction: append the result row, then CAS the
/// owning detection execution to its terminal state. A response whose row
/// is already terminal is a tolerated duplicate: the result is still
/// appended (audit-visible), the status does not change.
pub struct ResultConsumer<C: Clock> {
    store: Arc<dyn StoreGateway>,
    clock: C,
}

impl<C: Clock> ResultConsumer<C> {
    pub fn new(store: Arc<dyn StoreGateway>, clock: C) -> Self {
        Self { store, clock }
    }

    fn new_result(response: &DetectionResponse) -> NewDetectionResult {
        // Correlation and worker identity ride along in the metadata so
        // failed rows carry structured diagnostics.
        let metadata = json!({
            "task_id": response.task_id,
            "worker_id": response.worker_id,
            "outcome": response.outcome,
            "reported": response.metadata,
        });
        NewDetectionResult {
            detection_execution_id: response.detection_execution_id,
            detected: response.detected,
            raw_response: response.raw_response.clone(),
            parsed_results: response.parsed_results.clone(),
            result_timestamp: response.finished_at,
            result_source: response.source.clone(),
            metadata,
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Handler for ResultConsumer<C> {
    fn name(&self) -> &str {
        "results"
    }

    async fn handle(&self, payload: &[u8]) -> Disposition {
        let response = match decode_response(payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "rejecting malformed detection response");
                return Disposition::DeadLetter { tag: "malformed", detail: e.to_string() };
            }
        };

        let id = response.detection_execution_id;
        let terminal = response.outcome.terminal_status();

        let outcome = match self
            .store
            .record_response(Self::new_result(&response), terminal, self.clock.now_utc())
            .await
        {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound { .. }) => {
                warn!(detection_execution_id = %id, "response with unknown correlation");
                return Disposition::DeadLetter {
                    tag: "unknown-correlation",
                    detail: format!("no detection execution {id}"),
                };
            }
            Err(e) if e.is_transient() => {
                warn!(detection_execution_id = %id, error = %e, "record failed, requeueing");
                return Disposition::Requeue;
            }
            Err(e) => {
                warn!(detection_execution_id = %id, error = %e, "rejecting detection response");
                return Disposition::DeadLetter { tag: "constraint", detail: e.to_string() };
            }
        };

        if outcome.transitioned {
            info!(
                detection_execution_id = %id,
                status = %outcome.detection_execution.status,
                detected = %outcome.result.detected,
                source = %outcome.result.result_source,
                "detection finished"
            );
        } else {
            info!(
                detection_execution_id = %id,
                status = %outcome.detection_execution.status,
                "duplicate response appended, status unchanged"
            );
        }
        Disposition::Ack
    }
}

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;
