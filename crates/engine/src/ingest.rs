// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingestion consumer: execution records in, pending detection tasks out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use vigil_broker::{Disposition, Handler};
use vigil_core::{Clock, NewExecution, OperationUpsert};
use vigil_store::StoreGateway;
use vigil_wire::{decode_record, ExecutionRecord};

use crate::dispatcher::Dispatcher;
use crate::planner::plan;

/// Consumes the instructions queue.
///
/// One delivery is one transaction: upsert the operation, create the
/// execution if its `link_id` is new, and insert one pending detection
/// execution per plan entry. Tasks are published only after the commit,
/// so every task message has a matching pending row; a publish failure
/// requeues the delivery and the idempotent replay path re-offers the
/// rows that are still pending.
pub struct IngestionConsumer<C: Clock> {
    store: Arc<dyn StoreGateway>,
    dispatcher: Arc<Dispatcher<C>>,
    default_max_retries: i32,
}

impl<C: Clock> IngestionConsumer<C> {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        dispatcher: Arc<Dispatcher<C>>,
        default_max_retries: i32,
    ) -> Self {
        Self { store, dispatcher, default_max_retries }
    }

    fn operation_upsert(record: &ExecutionRecord) -> OperationUpsert {
        OperationUpsert {
            external_id: record.operation.id,
            name: record.operation.name.clone(),
            started_at: record.operation.started_at,
            metadata: serde_json::json!({}),
            observed_at: record.execution.agent_reported_at,
        }
    }

    fn new_execution(record: &ExecutionRecord) -> NewExecution {
        let execution = &record.execution;
        NewExecution {
            operation_external_id: record.operation.id,
            link_id: execution.link_id,
            agent_host: execution.agent_host.clone(),
            agent_paw: execution.agent_paw.clone(),
            command: execution.command.clone(),
            pid: execution.pid,
            status: execution.status,
            result_data: execution.result_data.clone(),
            agent_reported_at: execution.agent_reported_at,
            link_state: execution.link_state.clone(),
            raw_message: record.raw_message.clone(),
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> Handler for IngestionConsumer<C> {
    fn name(&self) -> &str {
        "ingestion"
    }

    async fn handle(&self, payload: &[u8]) -> Disposition {
        let record = match decode_record(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "rejecting malformed execution record");
                return Disposition::DeadLetter { tag: "malformed", detail: e.to_string() };
            }
        };

        let link_id = record.execution.link_id;
        let planned = plan(&record.detections, self.default_max_retries);

        let outcome = match self
            .store
            .ingest_execution(
                Self::operation_upsert(&record),
                Self::new_execution(&record),
                planned,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                warn!(%link_id, error = %e, "ingest transaction failed, requeueing");
                return Disposition::Requeue;
            }
            Err(e) => {
                warn!(%link_id, error = %e, "rejecting execution record");
                return Disposition::DeadLetter { tag: "constraint", detail: e.to_string() };
            }
        };

        if !outcome.created {
            info!(
                %link_id,
                pending = outcome.detections.len(),
                "duplicate execution record, replaying pending dispatches"
            );
        }

        for detection in &outcome.detections {
            if let Err(e) = self.dispatcher.dispatch(detection).await {
                // Nacked before ack: the broker redelivers and the replay
                // path retries whatever is still pending.
                warn!(
                    %link_id,
                    detection_execution_id = %detection.id,
                    error = %e,
                    "task publish failed, requeueing instruction"
                );
                return Disposition::Requeue;
            }
        }

        info!(
            %link_id,
            operation = %outcome.operation.external_id,
            created = outcome.created,
            tasks = outcome.detections.len(),
            "execution ingested"
        );
        Disposition::Ack
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
