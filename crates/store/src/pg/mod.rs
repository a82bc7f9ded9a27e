// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres implementation of the store gateway.
//!
//! All SQL is runtime-checked (`sqlx::query`, not the compile-time macros)
//! to avoid a database requirement at build time. Every mutator opens one
//! transaction; every public call runs under the configured transaction
//! budget and maps a blown budget to [`StoreError::Transient`].

mod rows;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use vigil_core::{
    Clock, DetectionExecutionId, DetectionExecutionRow, DetectionResultId, DetectionResultRow,
    DetectionStatus, ExecutionId, ExecutionRow, NewDetectionExecution, NewDetectionResult,
    NewExecution, OperationId, OperationRow, OperationUpsert, PlannedDetection, SystemClock,
    TransitionPatch,
};

use crate::gateway::{IngestOutcome, RecordOutcome, StoreGateway, TimeWindow};
use crate::StoreError;
use rows::{PgDetectionExecutionRow, PgDetectionResultRow, PgExecutionRow, PgOperationRow};

const OPERATION_COLS: &str = "id, external_id, name, started_at, created_at, updated_at, metadata";
const EXECUTION_COLS: &str = "id, operation_external_id, agent_host, agent_paw, link_id, \
     command, pid, status, result_data, agent_reported_at, link_state, created_at, raw_message";
const DETECTION_COLS: &str = "id, execution_id, operation_external_id, detection_type, \
     detection_platform, detection_config, status, started_at, completed_at, retry_count, \
     max_retries, execution_metadata, created_at";
const RESULT_COLS: &str = "id, detection_execution_id, detected, raw_response, parsed_results, \
     result_timestamp, result_source, metadata, created_at";

/// Postgres-backed store gateway.
#[derive(Clone)]
pub struct PgStore<C: Clock = SystemClock> {
    pool: PgPool,
    clock: C,
    txn_budget: Duration,
}

impl PgStore<SystemClock> {
    /// Connect a pool with the configured bounds.
    pub async fn connect(
        url: &str,
        pool_min: u32,
        pool_max: u32,
        txn_budget: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(pool_min)
            .max_connections(pool_max)
            .connect(url)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(Self { pool, clock: SystemClock, txn_budget })
    }
}

impl<C: Clock> PgStore<C> {
    pub fn with_clock(pool: PgPool, clock: C, txn_budget: Duration) -> Self {
        Self { pool, clock, txn_budget }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for borrowed connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn within_budget<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        match tokio::time::timeout(self.txn_budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Transient(format!(
                "transaction exceeded {}ms budget",
                self.txn_budget.as_millis()
            ))),
        }
    }
}

// ── SQL helpers (shared between single mutators and composites) ──

async fn upsert_operation_in(
    conn: &mut PgConnection,
    op: &OperationUpsert,
    now: DateTime<Utc>,
) -> Result<OperationRow, StoreError> {
    let sql = format!(
        "INSERT INTO operations ({OPERATION_COLS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (external_id) DO UPDATE SET \
             name = EXCLUDED.name, \
             metadata = EXCLUDED.metadata, \
             updated_at = EXCLUDED.updated_at \
         WHERE operations.updated_at < EXCLUDED.updated_at \
         RETURNING {OPERATION_COLS}"
    );
    let updated = sqlx::query_as::<_, PgOperationRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(op.external_id.as_uuid())
        .bind(&op.name)
        .bind(op.started_at)
        .bind(now)
        .bind(op.observed_at)
        .bind(&op.metadata)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;

    match updated {
        Some(row) => Ok(row.into()),
        // The conflict target exists and is newer; the upsert is a no-op.
        None => {
            let sql = format!("SELECT {OPERATION_COLS} FROM operations WHERE external_id = $1");
            let row = sqlx::query_as::<_, PgOperationRow>(&sql)
                .bind(op.external_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(StoreError::from_sqlx)?
                .ok_or(StoreError::NotFound {
                    entity: "operation",
                    id: op.external_id.as_uuid(),
                })?;
            Ok(row.into())
        }
    }
}

async fn create_execution_in(
    conn: &mut PgConnection,
    new: &NewExecution,
    now: DateTime<Utc>,
) -> Result<(ExecutionRow, bool), StoreError> {
    let result_data = serde_json::to_value(&new.result_data)
        .map_err(|e| StoreError::Constraint(format!("result_data: {e}")))?;
    let sql = format!(
        "INSERT INTO executions ({EXECUTION_COLS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (operation_external_id, link_id) DO NOTHING \
         RETURNING {EXECUTION_COLS}"
    );
    let inserted = sqlx::query_as::<_, PgExecutionRow>(&sql)
        .bind(ExecutionId::new().as_uuid())
        .bind(new.operation_external_id.as_uuid())
        .bind(&new.agent_host)
        .bind(&new.agent_paw)
        .bind(new.link_id.as_uuid())
        .bind(&new.command)
        .bind(new.pid)
        .bind(new.status)
        .bind(result_data)
        .bind(new.agent_reported_at)
        .bind(&new.link_state)
        .bind(now)
        .bind(&new.raw_message)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;

    if let Some(row) = inserted {
        return Ok((row.try_into()?, true));
    }

    let sql = format!(
        "SELECT {EXECUTION_COLS} FROM executions \
         WHERE operation_external_id = $1 AND link_id = $2"
    );
    let row = sqlx::query_as::<_, PgExecutionRow>(&sql)
        .bind(new.operation_external_id.as_uuid())
        .bind(new.link_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or(StoreError::NotFound { entity: "execution", id: new.link_id.as_uuid() })?;
    Ok((row.try_into()?, false))
}

async fn insert_detection_in(
    conn: &mut PgConnection,
    new: &NewDetectionExecution,
    now: DateTime<Utc>,
) -> Result<DetectionExecutionRow, StoreError> {
    let sql = format!(
        "INSERT INTO detection_executions ({DETECTION_COLS}) \
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', NULL, NULL, 0, $7, '{{}}'::jsonb, $8) \
         RETURNING {DETECTION_COLS}"
    );
    let row = sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
        .bind(DetectionExecutionId::new().as_uuid())
        .bind(new.execution_id.as_uuid())
        .bind(new.operation_external_id.as_uuid())
        .bind(new.detection_type.as_str())
        .bind(&new.detection_platform)
        .bind(&new.detection_config)
        .bind(new.max_retries)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    row.try_into()
}

async fn fetch_detection_in(
    conn: &mut PgConnection,
    id: DetectionExecutionId,
) -> Result<Option<DetectionExecutionRow>, StoreError> {
    let sql = format!("SELECT {DETECTION_COLS} FROM detection_executions WHERE id = $1");
    sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?
        .map(TryInto::try_into)
        .transpose()
}

async fn transition_in(
    conn: &mut PgConnection,
    id: DetectionExecutionId,
    from: &[DetectionStatus],
    to: DetectionStatus,
    patch: &TransitionPatch,
) -> Result<Option<DetectionExecutionRow>, StoreError> {
    let from_states: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
    let sql = format!(
        "UPDATE detection_executions SET \
             status = $2, \
             started_at = COALESCE(started_at, $3), \
             completed_at = COALESCE($4, completed_at), \
             retry_count = COALESCE($5, retry_count), \
             execution_metadata = COALESCE($6, execution_metadata) \
         WHERE id = $1 AND status = ANY($7) \
         RETURNING {DETECTION_COLS}"
    );
    sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
        .bind(id.as_uuid())
        .bind(to.as_str())
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(patch.retry_count)
        .bind(patch.execution_metadata.as_ref())
        .bind(from_states)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?
        .map(TryInto::try_into)
        .transpose()
}

async fn insert_result_in(
    conn: &mut PgConnection,
    new: &NewDetectionResult,
    now: DateTime<Utc>,
) -> Result<DetectionResultRow, StoreError> {
    let sql = format!(
        "INSERT INTO detection_results ({RESULT_COLS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {RESULT_COLS}"
    );
    let row = sqlx::query_as::<_, PgDetectionResultRow>(&sql)
        .bind(DetectionResultId::new().as_uuid())
        .bind(new.detection_execution_id.as_uuid())
        .bind(new.detected.as_bool())
        .bind(&new.raw_response)
        .bind(&new.parsed_results)
        .bind(new.result_timestamp)
        .bind(&new.result_source)
        .bind(&new.metadata)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    Ok(row.into())
}

async fn pending_for_execution_in(
    conn: &mut PgConnection,
    id: ExecutionId,
) -> Result<Vec<DetectionExecutionRow>, StoreError> {
    let sql = format!(
        "SELECT {DETECTION_COLS} FROM detection_executions \
         WHERE execution_id = $1 AND status = 'pending' \
         ORDER BY detection_type, detection_platform"
    );
    sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
}

#[async_trait]
impl<C: Clock + 'static> StoreGateway for PgStore<C> {
    async fn upsert_operation(&self, op: OperationUpsert) -> Result<OperationRow, StoreError> {
        let now = self.clock.now_utc();
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let row = upsert_operation_in(&mut tx, &op, now).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(row)
        })
        .await
    }

    async fn create_execution_if_absent(
        &self,
        new: NewExecution,
    ) -> Result<(ExecutionRow, bool), StoreError> {
        let now = self.clock.now_utc();
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let out = create_execution_in(&mut tx, &new, now).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(out)
        })
        .await
    }

    async fn create_detection_execution(
        &self,
        new: NewDetectionExecution,
    ) -> Result<DetectionExecutionRow, StoreError> {
        let now = self.clock.now_utc();
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let row = insert_detection_in(&mut tx, &new, now).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(row)
        })
        .await
    }

    async fn transition_detection_execution(
        &self,
        id: DetectionExecutionId,
        from: &[DetectionStatus],
        to: DetectionStatus,
        patch: TransitionPatch,
    ) -> Result<DetectionExecutionRow, StoreError> {
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let updated = transition_in(&mut tx, id, from, to, &patch).await?;
            let row = match updated {
                Some(row) => row,
                None => {
                    // CAS refused: distinguish a missing row from a state
                    // mismatch before reporting.
                    let current = fetch_detection_in(&mut tx, id).await?.ok_or(
                        StoreError::NotFound { entity: "detection execution", id: id.as_uuid() },
                    )?;
                    return Err(StoreError::Conflict {
                        id: id.as_uuid(),
                        actual: current.status,
                    });
                }
            };
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(row)
        })
        .await
    }

    async fn append_detection_result(
        &self,
        new: NewDetectionResult,
    ) -> Result<DetectionResultRow, StoreError> {
        let now = self.clock.now_utc();
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let row = insert_result_in(&mut tx, &new, now).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(row)
        })
        .await
    }

    async fn ingest_execution(
        &self,
        op: OperationUpsert,
        exec: NewExecution,
        planned: Vec<PlannedDetection>,
    ) -> Result<IngestOutcome, StoreError> {
        let now = self.clock.now_utc();
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

            let operation = upsert_operation_in(&mut tx, &op, now).await?;
            let (execution, created) = create_execution_in(&mut tx, &exec, now).await?;

            let detections = if created {
                let mut rows = Vec::with_capacity(planned.len());
                for entry in planned {
                    let new = NewDetectionExecution::from_planned(
                        entry,
                        execution.id,
                        execution.operation_external_id,
                    );
                    rows.push(insert_detection_in(&mut tx, &new, now).await?);
                }
                rows
            } else {
                // Replay path: re-dispatch whatever is still pending so a
                // crash between commit and publish cannot strand tasks.
                pending_for_execution_in(&mut tx, execution.id).await?
            };

            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(IngestOutcome { operation, execution, created, detections })
        })
        .await
    }

    async fn record_response(
        &self,
        new: NewDetectionResult,
        terminal: DetectionStatus,
        completed_at: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let now = self.clock.now_utc();
        let id = new.detection_execution_id;
        self.within_budget(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

            let existing = fetch_detection_in(&mut tx, id).await?.ok_or(
                StoreError::NotFound { entity: "detection execution", id: id.as_uuid() },
            )?;

            let result = insert_result_in(&mut tx, &new, now).await?;

            let from = [DetectionStatus::Pending, DetectionStatus::Running];
            let patch = TransitionPatch::completed(completed_at);
            let updated = transition_in(&mut tx, id, &from, terminal, &patch).await?;
            let transitioned = updated.is_some();
            let detection_execution = updated.unwrap_or(existing);

            tx.commit().await.map_err(StoreError::from_sqlx)?;
            Ok(RecordOutcome { result, detection_execution, transitioned })
        })
        .await
    }

    async fn operation_by_external_id(
        &self,
        id: OperationId,
    ) -> Result<OperationRow, StoreError> {
        let sql = format!("SELECT {OPERATION_COLS} FROM operations WHERE external_id = $1");
        let row = sqlx::query_as::<_, PgOperationRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or(StoreError::NotFound { entity: "operation", id: id.as_uuid() })?;
        Ok(row.into())
    }

    async fn execution_by_id(&self, id: ExecutionId) -> Result<ExecutionRow, StoreError> {
        let sql = format!("SELECT {EXECUTION_COLS} FROM executions WHERE id = $1");
        let row = sqlx::query_as::<_, PgExecutionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or(StoreError::NotFound { entity: "execution", id: id.as_uuid() })?;
        row.try_into()
    }

    async fn detection_execution_by_id(
        &self,
        id: DetectionExecutionId,
    ) -> Result<DetectionExecutionRow, StoreError> {
        let sql = format!("SELECT {DETECTION_COLS} FROM detection_executions WHERE id = $1");
        let row = sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or(StoreError::NotFound { entity: "detection execution", id: id.as_uuid() })?;
        row.try_into()
    }

    async fn detection_executions_for_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError> {
        let sql = format!(
            "SELECT {DETECTION_COLS} FROM detection_executions \
             WHERE execution_id = $1 ORDER BY detection_type, detection_platform"
        );
        sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn detection_executions_by_status(
        &self,
        status: DetectionStatus,
    ) -> Result<Vec<DetectionExecutionRow>, StoreError> {
        let sql = format!(
            "SELECT {DETECTION_COLS} FROM detection_executions \
             WHERE status = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, PgDetectionExecutionRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn detection_results_for(
        &self,
        id: DetectionExecutionId,
    ) -> Result<Vec<DetectionResultRow>, StoreError> {
        let sql = format!(
            "SELECT {RESULT_COLS} FROM detection_results \
             WHERE detection_execution_id = $1 ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, PgDetectionResultRow>(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn executions_in_window(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<ExecutionRow>, StoreError> {
        let sql = format!(
            "SELECT {EXECUTION_COLS} FROM executions \
             WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at"
        );
        sqlx::query_as::<_, PgExecutionRow>(&sql)
            .bind(window.from)
            .bind(window.until)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }
}
