// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres row structs.
//!
//! sqlx-facing shapes stay here so the domain crate never sees database
//! types; each converts into its `vigil-core` row, rejecting values that
//! violate the column check constraints.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use vigil_core::{
    Detected, DetectionExecutionId, DetectionExecutionRow, DetectionResultId, DetectionResultRow,
    DetectionStatus, DetectionType, ExecutionId, ExecutionRow, LinkId, OperationId, OperationRow,
    ResultData,
};

use crate::StoreError;

#[derive(Debug, FromRow)]
pub(crate) struct PgOperationRow {
    pub id: Uuid,
    pub external_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

impl From<PgOperationRow> for OperationRow {
    fn from(r: PgOperationRow) -> Self {
        OperationRow {
            id: r.id,
            external_id: OperationId::from_uuid(r.external_id),
            name: r.name,
            started_at: r.started_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
            metadata: r.metadata,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PgExecutionRow {
    pub id: Uuid,
    pub operation_external_id: Uuid,
    pub agent_host: String,
    pub agent_paw: String,
    pub link_id: Uuid,
    pub command: String,
    pub pid: i64,
    pub status: i32,
    pub result_data: Value,
    pub agent_reported_at: DateTime<Utc>,
    pub link_state: String,
    pub created_at: DateTime<Utc>,
    pub raw_message: Value,
}

impl TryFrom<PgExecutionRow> for ExecutionRow {
    type Error = StoreError;

    fn try_from(r: PgExecutionRow) -> Result<Self, StoreError> {
        let result_data: ResultData = serde_json::from_value(r.result_data)
            .map_err(|e| StoreError::Constraint(format!("execution {}: result_data: {e}", r.id)))?;
        Ok(ExecutionRow {
            id: ExecutionId::from_uuid(r.id),
            operation_external_id: OperationId::from_uuid(r.operation_external_id),
            agent_host: r.agent_host,
            agent_paw: r.agent_paw,
            link_id: LinkId::from_uuid(r.link_id),
            command: r.command,
            pid: r.pid,
            status: r.status,
            result_data,
            agent_reported_at: r.agent_reported_at,
            link_state: r.link_state,
            created_at: r.created_at,
            raw_message: r.raw_message,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PgDetectionExecutionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub operation_external_id: Uuid,
    pub detection_type: String,
    pub detection_platform: String,
    pub detection_config: Value,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub execution_metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PgDetectionExecutionRow> for DetectionExecutionRow {
    type Error = StoreError;

    fn try_from(r: PgDetectionExecutionRow) -> Result<Self, StoreError> {
        let detection_type = DetectionType::from_str(&r.detection_type)
            .map_err(|e| StoreError::Constraint(format!("detection execution {}: {e}", r.id)))?;
        let status = DetectionStatus::from_str(&r.status)
            .map_err(|e| StoreError::Constraint(format!("detection execution {}: {e}", r.id)))?;
        Ok(DetectionExecutionRow {
            id: DetectionExecutionId::from_uuid(r.id),
            execution_id: ExecutionId::from_uuid(r.execution_id),
            operation_external_id: OperationId::from_uuid(r.operation_external_id),
            detection_type,
            detection_platform: r.detection_platform,
            detection_config: r.detection_config,
            status,
            started_at: r.started_at,
            completed_at: r.completed_at,
            retry_count: r.retry_count,
            max_retries: r.max_retries,
            execution_metadata: r.execution_metadata,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PgDetectionResultRow {
    pub id: Uuid,
    pub detection_execution_id: Uuid,
    pub detected: Option<bool>,
    pub raw_response: Value,
    pub parsed_results: Value,
    pub result_timestamp: DateTime<Utc>,
    pub result_source: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<PgDetectionResultRow> for DetectionResultRow {
    fn from(r: PgDetectionResultRow) -> Self {
        DetectionResultRow {
            id: DetectionResultId::from_uuid(r.id),
            detection_execution_id: DetectionExecutionId::from_uuid(r.detection_execution_id),
            detected: Detected::from_bool(r.detected),
            raw_response: r.raw_response,
            parsed_results: r.parsed_results,
            result_timestamp: r.result_timestamp,
            result_source: r.result_source,
            metadata: r.metadata,
            created_at: r.created_at,
        }
    }
}
