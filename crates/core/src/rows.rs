// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row structs for the four durable entities, plus the input shapes the
//! store gateway accepts.
//!
//! Rows are plain data: domain services receive them and return them, and
//! never mutate them in place. The store gateway owns every row lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detection::{Detected, DetectionStatus, DetectionType};
use crate::id::{DetectionExecutionId, DetectionResultId, ExecutionId, LinkId, OperationId};

/// One emulation campaign, created on first sighting of any execution
/// referencing it. Never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    /// Internal surrogate key.
    pub id: uuid::Uuid,
    /// Upstream-supplied unique identifier.
    pub external_id: OperationId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

/// Captured stdout/stderr/exit of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// One command result reported by one agent. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRow {
    pub id: ExecutionId,
    pub operation_external_id: OperationId,
    pub agent_host: String,
    pub agent_paw: String,
    /// Unique per `(operation_external_id, link_id)`.
    pub link_id: LinkId,
    pub command: String,
    pub pid: i64,
    pub status: i32,
    pub result_data: ResultData,
    pub agent_reported_at: DateTime<Utc>,
    /// Free-form upstream state tag, e.g. SUCCESS/FAILED.
    pub link_state: String,
    pub created_at: DateTime<Utc>,
    /// Original producer envelope, retained for audit.
    pub raw_message: Value,
}

/// One planned detection attempt against one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionExecutionRow {
    pub id: DetectionExecutionId,
    pub execution_id: ExecutionId,
    pub operation_external_id: OperationId,
    pub detection_type: DetectionType,
    /// Free-form platform tag, e.g. cym, ajant, psh, sh.
    pub detection_platform: String,
    pub detection_config: Value,
    pub status: DetectionStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff status is terminal.
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub execution_metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// One observation reported by a worker. Append-only; the most recent row
/// is the final outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResultRow {
    pub id: DetectionResultId,
    pub detection_execution_id: DetectionExecutionId,
    pub detected: Detected,
    pub raw_response: Value,
    pub parsed_results: Value,
    pub result_timestamp: DateTime<Utc>,
    pub result_source: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Input for the idempotent operation upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationUpsert {
    pub external_id: OperationId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub metadata: Value,
    /// Timestamp of the record carrying this sighting. `name`/`metadata`
    /// are refreshed only when the stored row's `updated_at` is older.
    pub observed_at: DateTime<Utc>,
}

/// Input for creating an execution row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub operation_external_id: OperationId,
    pub link_id: LinkId,
    pub agent_host: String,
    pub agent_paw: String,
    pub command: String,
    pub pid: i64,
    pub status: i32,
    pub result_data: ResultData,
    pub agent_reported_at: DateTime<Utc>,
    pub link_state: String,
    pub raw_message: Value,
}

/// One entry of a detection plan: which detector to run where, with what
/// configuration. Produced by the planner, consumed by the store when it
/// inserts pending detection executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDetection {
    pub detection_type: DetectionType,
    pub detection_platform: String,
    pub detection_config: Value,
    pub max_retries: i32,
}

impl PlannedDetection {
    /// Sort key giving the deterministic `(type, platform)` plan order.
    pub fn sort_key(&self) -> (DetectionType, &str) {
        (self.detection_type, self.detection_platform.as_str())
    }
}

/// Input for creating a detection execution row (inserted `pending`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetectionExecution {
    pub execution_id: ExecutionId,
    pub operation_external_id: OperationId,
    pub detection_type: DetectionType,
    pub detection_platform: String,
    pub detection_config: Value,
    pub max_retries: i32,
}

impl NewDetectionExecution {
    /// Bind one plan entry to the execution it detects.
    pub fn from_planned(
        planned: PlannedDetection,
        execution_id: ExecutionId,
        operation_external_id: OperationId,
    ) -> Self {
        Self {
            execution_id,
            operation_external_id,
            detection_type: planned.detection_type,
            detection_platform: planned.detection_platform,
            detection_config: planned.detection_config,
            max_retries: planned.max_retries,
        }
    }
}

/// Input for appending a detection result.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetectionResult {
    pub detection_execution_id: DetectionExecutionId,
    pub detected: Detected,
    pub raw_response: Value,
    pub parsed_results: Value,
    pub result_timestamp: DateTime<Utc>,
    pub result_source: String,
    pub metadata: Value,
}

/// Optional column updates applied together with a CAS status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPatch {
    /// Applied only if the row has no `started_at` yet.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: Option<i32>,
    pub execution_metadata: Option<Value>,
}

impl TransitionPatch {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self { started_at: Some(at), ..Self::default() }
    }

    pub fn completed(at: DateTime<Utc>) -> Self {
        Self { completed_at: Some(at), ..Self::default() }
    }

    pub fn retry(count: i32, metadata: Value) -> Self {
        Self { retry_count: Some(count), execution_metadata: Some(metadata), ..Self::default() }
    }
}

crate::builder! {
    pub struct ExecutionRowBuilder => ExecutionRow {
        into {
            agent_host: String = "host-1",
            agent_paw: String = "paw-1",
            command: String = "whoami",
            link_state: String = "SUCCESS",
        }
        set {
            id: ExecutionId = ExecutionId::new(),
            operation_external_id: OperationId = OperationId::new(),
            link_id: LinkId = LinkId::new(),
            pid: i64 = 4242,
            status: i32 = 0,
            result_data: ResultData = ResultData::default(),
            raw_message: Value = Value::Null,
        }
        computed {
            agent_reported_at: DateTime<Utc> = Utc::now(),
            created_at: DateTime<Utc> = Utc::now(),
        }
    }
}

crate::builder! {
    pub struct DetectionExecutionRowBuilder => DetectionExecutionRow {
        into {
            detection_platform: String = "siem",
        }
        set {
            id: DetectionExecutionId = DetectionExecutionId::new(),
            execution_id: ExecutionId = ExecutionId::new(),
            operation_external_id: OperationId = OperationId::new(),
            detection_type: DetectionType = DetectionType::Api,
            detection_config: Value = serde_json::json!({}),
            status: DetectionStatus = DetectionStatus::Pending,
            retry_count: i32 = 0,
            max_retries: i32 = 3,
            execution_metadata: Value = serde_json::json!({}),
        }
        option {
            started_at: DateTime<Utc> = None,
            completed_at: DateTime<Utc> = None,
        }
        computed {
            created_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "rows_tests.rs"]
mod tests;
