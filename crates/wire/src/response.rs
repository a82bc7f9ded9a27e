// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection response: the message a worker publishes after a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{Detected, DetectionExecutionId, Outcome, TaskId};

/// One worker observation for one detection execution.
///
/// `detected` is tri-state (`true`/`false`/`null`); `outcome` alone decides
/// whether the owning detection execution completes or fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub task_id: TaskId,
    pub detection_execution_id: DetectionExecutionId,
    pub outcome: Outcome,
    pub detected: Detected,
    pub raw_response: Value,
    pub parsed_results: Value,
    pub source: String,
    pub worker_id: String,
    #[serde(with = "crate::timestamp")]
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}
