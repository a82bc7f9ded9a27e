// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Api/agent task: the message the dispatcher sends to a worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{DetectionExecutionId, DetectionType, ExecutionId, OperationId, TaskId};

/// One detection task, correlated back to its rows by the IDs it carries.
/// Messages hold references into the store; they do not own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionTask {
    pub task_id: TaskId,
    pub detection_execution_id: DetectionExecutionId,
    pub execution_id: ExecutionId,
    pub operation_id: OperationId,
    pub detection_type: DetectionType,
    pub platform: String,
    /// Copied verbatim from the record's `detections` map.
    pub config: Value,
    pub max_retries: i32,
    #[serde(with = "crate::timestamp")]
    pub enqueued_at: DateTime<Utc>,
}

impl DetectionTask {
    /// Routing key the dispatcher publishes this task under.
    pub fn routing_key(&self) -> &'static str {
        if self.detection_type.is_agent() {
            crate::codec::ROUTE_AGENT_TASK
        } else {
            crate::codec::ROUTE_API_TASK
        }
    }

    /// Routing key the worker publishes the matching response under.
    pub fn response_routing_key(&self) -> &'static str {
        if self.detection_type.is_agent() {
            crate::codec::ROUTE_AGENT_RESPONSE
        } else {
            crate::codec::ROUTE_API_RESPONSE
        }
    }
}
