// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store gateway for tests.
//!
//! Mirrors the Postgres implementation's semantics (idempotent upserts,
//! CAS transitions, append-only results) without a database. Exported
//! behind `test-support` so other crates' tests can wire real handlers
//! against it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use vigil_core::{
    Clock, DetectionExecutionId, DetectionExecutionRow, DetectionResultId, DetectionResultRow,
    DetectionStatus, ExecutionId, ExecutionRow, FakeClock, LinkId, NewDetectionExecution,
    NewDetectionResult, NewExecution, OperationId, OperationRow, OperationUpsert,
    PlannedDetection, TransitionPatch,
};

use crate::gateway::{IngestOutcome, RecordOutcome, StoreGateway, TimeWindow};
use crate::StoreError;

#[derive(Default)]
struct Tables {
    operations: HashMap<OperationId, OperationRow>,
    executions: HashMap<ExecutionId, ExecutionRow>,
    execution_index: HashMap<(OperationId, LinkId), ExecutionId>,
    detections: HashMap<DetectionExecutionId, DetectionExecutionRow>,
    results: Vec<DetectionResultRow>,
}

/// In-memory store gateway.
pub struct MemStore<C: Clock = FakeClock> {
    clock: C,
    tables: Mutex<Tables>,
}

impl MemStore<FakeClock> {
    pub fn new() -> Self {
        Self::with_clock(FakeClock::new())
    }
}

impl Default for MemStore<FakeClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock, tables: Mutex::new(Tables::default()) }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Counts per table, for invariant assertions.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let t = self.tables.lock();
        (t.operations.len(), t.executions.len(), t.detections.len(), t.results.len())
    }
}

fn upsert_operation_mem(
    t: &mut Tables,
    op: &OperationUpsert,
    now: DateTime<Utc>,
) -> OperationRow {
    match t.operations.get_mut(&op.external_id) {
        Some(existing) => {
            if existing.updated_at < op.observed_at {
                existing.name = op.name.clone();
                existing.metadata = op.metadata.clone();
                existing.updated_at = op.observed_at;
            }
            existing.clone()
        }
        None => {
            let row = OperationRow {
                id: uuid::Uuid::new_v4(),
                external_id: op.external_id,
                name: op.name.clone(),
                started_at: op.started_at,
                created_at: now,
                updated_at: op.observed_at,
                metadata: op.metadata.clone(),
            };
            t.operations.insert(op.external_id, row.clone());
            row
        }
    }
}

fn create_execution_mem(
    t: &mut Tables,
    new: &NewExecution,
    now: DateTime<Utc>,
) -> Result<(ExecutionRow, bool), StoreError> {
    let key = (new.operation_external_id, new.link_id);
    if let Some(id) = t.execution_index.get(&key) {
        let row = t.executions.get(id).cloned().ok_or(StoreError::NotFound {
            entity: "execution",
            id: id.as_uuid(),
        })?;
        return Ok((row, false));
    }
    let row = ExecutionRow {
        id: ExecutionId::new(),
        operation_external_id: new.operation_external_id,
        agent_host: new.agent_host.clone(),
        agent_paw: new.agent_paw.clone(),
        link_id: new.link_id,
        command: new.command.clone(),
        pid: new.pid,
        status: new.status,
        result_data: new.result_data.clone(),
        agent_reported_at: new.agent_reported_at,
        link_state: new.link_state.clone(),
        created_at: now,
        raw_message: new.raw_message.clone(),
    };
    t.execution_index.insert(key, row.id);
    t.executions.insert(row.id, row.clone());
    Ok((row, true))
}

fn insert_detection_mem(
    t: &mut Tables,
    new: &NewDetectionExecution,
    now: DateTime<Utc>,
) -> Result<DetectionExecutionRow, StoreError> {
    if !t.executions.contains_key(&new.execution_id) {
        return Err(StoreError::Constraint(format!(
            "detection execution references missing execution {}",
            new.execution_id
        )));
    }
    let row = DetectionExecutionRow {
        id: DetectionExecutionId::new(),
        execution_id: new.execution_id,
        operation_external_id: new.operation_external_id,
        detection_type: new.detection_type,
        detection_platform: new.detection_platform.clone(),
        detection_config: new.detection_config.clone(),
        status: DetectionStatus::Pending,
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: new.max_retries,
        execution_metadata: serde_json::json!({}),
        created_at: now,
    };
    t.detections.insert(row.id, row.clone());
    Ok(row)
}

fn transition_mem(
    t: &mut Tables,
    id: DetectionExecutionId,
    from: &[DetectionStatus],
    to: DetectionStatus,
    patch: &TransitionPatch,
) -> Result<Result<DetectionExecutionRow, DetectionStatus>, StoreError> {
    let row = t.detections.get_mut(&id).ok_or(StoreError::NotFound {
        entity: "detection execution",
        id: id.as_uuid(),
    })?;
    if !from.contains(&row.status) {
        return Ok(Err(row.status));
    }
    if let Some(count) = patch.retry_count {
        if count < 0 || count > row.max_retries {
            return Err(StoreError::Constraint(format!(
                "retry_count {count} outside 0..={}",
                row.max_retries
            )));
        }
    }
    row.status = to;
    if row.started_at.is_none() {
        row.started_at = patch.started_at;
    }
    if patch.completed_at.is_some() {
        row.completed_at = patch.completed_at;
    }
    if let Some(count) = patch.retry_count {
        row.retry_count = count;
    }
    if let Some(meta) = &patch.execution_metadata {
        row.execution_metadata = meta.clone();
    }
    Ok(Ok(row.clone()))
}

fn insert_result_mem(
    t: &mut Tables,
    new: &NewDetectionResult,
    now: DateTime<Utc>,
) -> Result<DetectionResultRow, StoreError> {
    if !t.detections.contains_key(&new.detection_execution_id) {
        return Err(StoreError::Constraint(format!(
            "detection result references missing detection execution {}",
            new.detection_execution_id
        )));
    }
    let row = DetectionResultRow {
        id: DetectionResultId::new(),
        detection_execution_id: new.detection_execution_id,
        detected: new.detected,
        raw_response: new.raw_response.clone(),
        parsed_results: new.parsed_results.clone(),
        result_timestamp: new.result_timestamp,
        result_source: new.result_source.clone(),
        metadata: new.metadata.clone(),
        created_at: now,
    };
    t.results.push(row.clone());
    Ok(row)
}

fn pending_for_execution_mem(t: &Tables, id: ExecutionId) -> Vec<DetectionExecutionRow> {
    let mut rows: Vec<DetectionExecutionRow> = t
        .detections
        .values()
        .filter(|d| d.execution_id == id && d.status == DetectionStatus::Pending)
        .cloned()
        .collect();
    rows.sort_by(|a, b| {
        (a.detection_type, &a.detection_platform).cmp(&(b.detection_type, &b.detection_platform))
    });
    rows
}

#[async_trait]
impl<C: Clock + 'static> StoreGateway for MemStore<C> {
    async fn upsert_operation(&self, op: OperationUpsert) -> Result<OperationRow, StoreError> {
        let now = self.clock.now_utc();
        Ok(upsert_operation_mem(&mut self.tables.lock(), &op, now))
    }

    async fn create_execution_if_absent(
        &self,
        new: NewExecution,
    ) -> Result<(ExecutionRow, bool), StoreError> {
        let now = self.clock.now_utc();
        create_execution_mem(&mut self.tables.lock(), &new, now)
    }

    async fn create_detection_execution(
        &self,
        new: NewDetectionExecution,
    ) -> Result<DetectionExecutionRow, StoreError> {
        let now = self.clock.now_utc();
        insert_detection_mem(&mut self.tables.lock(), &new, now)
    }

    async fn transition_detection_execution(
        &self,
        id: DetectionExecutionId,
        from: &[DetectionStatus],
        to: DetectionStatus,
        patch: TransitionPatch,
    ) -> Result<DetectionExecutionRow, StoreError> {
        match transition_mem(&mut self.tables.lock(), id, from, to, &patch)? {
            Ok(row) => Ok(row),
            Err(actual) => Err(StoreError::Conflict { id: id.as_uuid(), actual }),
        }
    }

    async fn append_detection_result(
        &self,
        new: NewDetectionResult,
    ) -> Result<DetectionResultRow, StoreError> {
        let now = self.clock.now_utc();
        insert_result_mem(&mut self.tables.lock(), &new, now)
    }

    async fn ingest_execution(
        &self,
        op: OperationUpsert,
        exec: NewExecution,
        planned: Vec<PlannedDetection>,
    ) -> Result<IngestOutcome, StoreError> {
        let now = self.clock.now_utc();
        let mut t = self.tables.lock();

        let operation = upsert_operation_mem(&mut t, &op, now);
        let (execution, created) = create_execution_mem(&mut t, &exec, now)?;

        let detections = if created {
            let mut rows = Vec::with_capacity(planned.len());
            for entry in planned {
                let new = NewDetectionExecution::from_planned(
                    entry,
                    execution.id,
                    execution.operation_external_id,
                );
                rows.push(insert_detection_mem(&mut t, &new, now)?);
            }
            rows
        } else {
            pending_for_execution_mem(&t, execution.id)
        };

        Ok(IngestOutcome { operation, execution, created, detections })
    }

    async fn record_response(
        &self,
        new: NewDetectionResult,
        terminal: DetectionStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let now = self.clock.now_utc();
        let id = new.detection_execution_id;
        let mut t = self.tables.lock();

        let existing = t
            .detections
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "detection execution", id: id.as_uuid() })?;

        let result = insert_result_mem(&mut t, &new, now)?;

        let from = [DetectionStatus::Pending, DetectionStatus::Running];
        let patch = TransitionPatch::completed(completed_at);
        let (detection_execution, transitioned) =
            match transition_mem(&mut t, id, &from, terminal, &patch)? {
                Ok(row) => (row, true),
                Err(_) => (existing, false),
            };

        Ok(RecordOutcome { result, detection_execution, transitioned })
    }

    async fn operation_by_external_id(
        &self,
        id: OperationId,
    ) -> Result<OperationRow, StoreError> {
        self.tables
            .lock()
            .operations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "operation", id: id.as_uuid() })
    }

    async fn execution_by_id(&self, id: ExecutionId) -> Result<ExecutionRow, StoreError> {
        self.tables
            .lock()
            .executions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "execution", id: id.as_uuid() })
    }

    async fn detection_execution_by_id(
        &self,
        id: DetectionExecutionId,
    ) -> Result<DetectionExecutionRow, StoreError> {
        self.tables
            .lock()
            .detections
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "detection execution", id: id.as_uuid() })
    }

    async fn detection_executions_for_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<DetectionExecutionRow> =
            t.detections.values().filter(|d| d.execution_id == id).cloned().collect();
        rows.sort_by(|a, b| {
            (a.detection_type, &a.detection_platform)
                .cmp(&(b.detection_type, &b.detection_platform))
        });
        Ok(rows)
    }

    async fn detection_executions_by_status(
        &self,
        status: DetectionStatus,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<DetectionExecutionRow> =
            t.detections.values().filter(|d| d.status == status).cloned().collect();
        rows.sort_by_key(|d| d.created_at);
        Ok(rows)
    }

    async fn detection_results_for(
        &self,
        id: DetectionExecutionId,
    ) -> Result<Vec<DetectionResultRow>, StoreError> {
        let t = self.tables.lock();
        Ok(t.results.iter().filter(|r| r.detection_execution_id == id).cloned().collect())
    }

    async fn executions_in_window(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<ExecutionRow>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<ExecutionRow> = t
            .executions
            .values()
            .filter(|e| e.created_at >= window.from && e.created_at < window.until)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
