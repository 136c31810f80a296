//! Execution and execution-log repository functions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{
        append_rows, ExecutionLogRow, ExecutionPatch, ExecutionRecord, ExecutionRow,
        ExecutionStatus,
    },
};

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Insert a new workflow execution record.
pub async fn create_execution(pool: &PgPool, row: &ExecutionRow) -> Result<ExecutionRow, DbError> {
    let inserted = sqlx::query_as::<_, ExecutionRow>(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, engine_execution_id, status, current_node, input_data,
             output_data, error, cancel_requested, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO NOTHING
        RETURNING id, workflow_id, engine_execution_id, status, current_node, input_data,
                  output_data, error, cancel_requested, started_at, finished_at
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.engine_execution_id)
    .bind(&row.status)
    .bind(&row.current_node)
    .bind(&row.input_data)
    .bind(&row.output_data)
    .bind(&row.error)
    .bind(row.cancel_requested)
    .bind(row.started_at)
    .bind(row.finished_at)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::AlreadyExists)?;

    Ok(inserted)
}

/// Fetch an execution together with its ordered log.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<ExecutionRecord, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, workflow_id, engine_execution_id, status, current_node, input_data,
               output_data, error, cancel_requested, started_at, finished_at
        FROM workflow_executions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let log = fetch_log(pool, id).await?;
    Ok(ExecutionRecord { row, log })
}

/// Every execution of `workflow_id`, oldest first.  Logs are not loaded.
pub async fn list_executions_by_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, workflow_id, engine_execution_id, status, current_node, input_data,
               output_data, error, cancel_requested, started_at, finished_at
        FROM workflow_executions
        WHERE workflow_id = $1
        ORDER BY started_at ASC, id ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply `patch` if the execution's status is in `allowed_from`.
///
/// The `UPDATE` takes the row lock, so concurrent updates of the same
/// execution are serialised by Postgres; the log append happens in the same
/// transaction.
pub async fn update_execution(
    pool: &PgPool,
    id: Uuid,
    allowed_from: &[ExecutionStatus],
    patch: ExecutionPatch,
) -> Result<ExecutionRecord, DbError> {
    let allowed: Vec<String> = allowed_from.iter().map(ToString::to_string).collect();
    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, ExecutionRow>(
        r#"
        UPDATE workflow_executions
        SET status           = COALESCE($2, status),
            current_node     = COALESCE($3, current_node),
            output_data      = COALESCE($4, output_data),
            error            = COALESCE($5, error),
            cancel_requested = COALESCE($6, cancel_requested),
            finished_at      = COALESCE($7, finished_at)
        WHERE id = $1 AND status = ANY($8)
        RETURNING id, workflow_id, engine_execution_id, status, current_node, input_data,
                  output_data, error, cancel_requested, started_at, finished_at
        "#,
    )
    .bind(id)
    .bind(patch.status.map(|s| s.to_string()))
    .bind(&patch.current_node)
    .bind(&patch.output_data)
    .bind(&patch.error)
    .bind(patch.cancel_requested)
    .bind(patch.finished_at)
    .bind(&allowed)
    .fetch_optional(&mut *tx)
    .await?;

    let row = match updated {
        Some(row) => row,
        None => {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM workflow_executions WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match current {
                Some((current,)) => DbError::StatusConflict { current },
                None => DbError::NotFound,
            });
        }
    };

    let (stored, last): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(logged_at) FROM execution_log WHERE execution_id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    for entry in append_rows(id, stored as usize, last, &patch.log) {
        sqlx::query(
            r#"
            INSERT INTO execution_log
                (execution_id, seq, node_id, node_name, status, result, error, logged_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.execution_id)
        .bind(entry.seq)
        .bind(&entry.node_id)
        .bind(&entry.node_name)
        .bind(&entry.status)
        .bind(&entry.result)
        .bind(&entry.error)
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let log = fetch_log(pool, id).await?;
    Ok(ExecutionRecord { row, log })
}

// ---------------------------------------------------------------------------
// execution_log
// ---------------------------------------------------------------------------

async fn fetch_log(pool: &PgPool, execution_id: Uuid) -> Result<Vec<ExecutionLogRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        SELECT execution_id, seq, node_id, node_name, status, result, error, logged_at
        FROM execution_log
        WHERE execution_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
