// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store gateway trait and its outcome types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vigil_core::{
    DetectionExecutionId, DetectionExecutionRow, DetectionResultRow, DetectionStatus, ExecutionId,
    ExecutionRow, NewDetectionExecution, NewDetectionResult, NewExecution, OperationId,
    OperationRow, OperationUpsert, PlannedDetection, TransitionPatch,
};

use crate::StoreError;

/// Result of ingesting one execution record.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub operation: OperationRow,
    pub execution: ExecutionRow,
    /// False when the record's `link_id` had been seen before.
    pub created: bool,
    /// Rows to hand to the dispatcher: the freshly inserted detections
    /// when `created`, otherwise the execution's still-pending rows (so a
    /// redelivery after a partial dispatch retries the publishes).
    pub detections: Vec<DetectionExecutionRow>,
}

/// Result of recording one detection response.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub result: DetectionResultRow,
    pub detection_execution: DetectionExecutionRow,
    /// False when the row was already terminal (duplicate response); the
    /// result row is appended either way.
    pub transitioned: bool,
}

/// Half-open time window for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Repository-style access to operations, executions, detection
/// executions, and detection results.
///
/// Each mutator is one database transaction. The composite operations
/// (`ingest_execution`, `record_response`) bundle the multi-row writes of
/// one logical event into a single transaction so a failure before commit
/// leaves the store unchanged.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Idempotent upsert keyed on `external_id`. `name`/`metadata` are
    /// refreshed only when the stored row's `updated_at` is older than the
    /// incoming `observed_at`; `created_at` never changes.
    async fn upsert_operation(&self, op: OperationUpsert) -> Result<OperationRow, StoreError>;

    /// Insert keyed on `(operation_external_id, link_id)`; returns the
    /// existing row with `false` when the link was already recorded.
    async fn create_execution_if_absent(
        &self,
        new: NewExecution,
    ) -> Result<(ExecutionRow, bool), StoreError>;

    /// Insert one detection execution in state `pending`.
    async fn create_detection_execution(
        &self,
        new: NewDetectionExecution,
    ) -> Result<DetectionExecutionRow, StoreError>;

    /// Compare-and-set status transition. Fails with [`StoreError::Conflict`]
    /// when the current status is not in `from`. `patch.started_at` only
    /// fills a null column; other patch fields overwrite when present.
    async fn transition_detection_execution(
        &self,
        id: DetectionExecutionId,
        from: &[DetectionStatus],
        to: DetectionStatus,
        patch: TransitionPatch,
    ) -> Result<DetectionExecutionRow, StoreError>;

    /// Append-only insert; duplicates are tolerated and audit-visible.
    async fn append_detection_result(
        &self,
        new: NewDetectionResult,
    ) -> Result<DetectionResultRow, StoreError>;

    /// One transaction for one ingested execution record: upsert the
    /// operation, create the execution if absent, and insert one pending
    /// detection execution per plan entry (skipped on replay).
    async fn ingest_execution(
        &self,
        op: OperationUpsert,
        exec: NewExecution,
        planned: Vec<PlannedDetection>,
    ) -> Result<IngestOutcome, StoreError>;

    /// One transaction for one detection response: append the result row,
    /// then CAS the owning detection execution from `{pending, running}`
    /// to `terminal`. An already-terminal row is a tolerated duplicate.
    async fn record_response(
        &self,
        new: NewDetectionResult,
        terminal: DetectionStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError>;

    // Query helpers. These feed the external read-only HTTP layer; the
    // engine itself only uses the by-id lookups.

    async fn operation_by_external_id(
        &self,
        id: OperationId,
    ) -> Result<OperationRow, StoreError>;

    async fn execution_by_id(&self, id: ExecutionId) -> Result<ExecutionRow, StoreError>;

    async fn detection_execution_by_id(
        &self,
        id: DetectionExecutionId,
    ) -> Result<DetectionExecutionRow, StoreError>;

    async fn detection_executions_for_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError>;

    async fn detection_executions_by_status(
        &self,
        status: DetectionStatus,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError>;

    async fn detection_results_for(
        &self,
        id: DetectionExecutionId,
    ) -> Result<Vec<DetectionResultRow>, StoreError>;

    async fn executions_in_window(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<ExecutionRow>, StoreError>;
}
