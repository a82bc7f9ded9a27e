// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task dispatcher: pending detection rows become broker task messages.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use vigil_broker::{BrokerError, Publisher};
use vigil_core::{Clock, DetectionExecutionRow, TaskId};
use vigil_wire::{encode_task, DetectionTask, WireError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Fire-and-forward publisher of detection tasks.
///
/// A task is only ever built from a persisted row, so every published
/// message has a matching `pending` row at the moment of publish. The
/// dispatcher never waits for worker responses.
pub struct Dispatcher<C: Clock> {
    publisher: Arc<dyn Publisher>,
    clock: C,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(publisher: Arc<dyn Publisher>, clock: C) -> Self {
        Self { publisher, clock }
    }

    /// Build the envelope for one persisted detection execution.
    pub fn build_task(&self, detection: &DetectionExecutionRow) -> DetectionTask {
        DetectionTask {
            task_id: TaskId::new(),
            detection_execution_id: detection.id,
            execution_id: detection.execution_id,
            operation_id: detection.operation_external_id,
            detection_type: detection.detection_type,
            platform: detection.detection_platform.clone(),
            config: detection.detection_config.clone(),
            max_retries: detection.max_retries,
            enqueued_at: self.clock.now_utc(),
        }
    }

    /// Publish one task, routed by detection type (`api` → the API task
    /// queue, everything else → the agent task queue). Errors propagate so
    /// the enclosing delivery is nacked and retried.
    pub async fn dispatch(
        &self,
        detection: &DetectionExecutionRow,
    ) -> Result<DetectionTask, DispatchError> {
        let task = self.build_task(detection);
        let payload = encode_task(&task)?;
        self.publisher.publish(task.routing_key(), &payload).await?;
        debug!(
            task_id = %task.task_id,
            detection_execution_id = %task.detection_execution_id,
            routing_key = task.routing_key(),
            "dispatched task"
        );
        Ok(task)
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
