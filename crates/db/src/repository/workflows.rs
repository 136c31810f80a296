//! Workflow CRUD operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

/// Insert a new workflow row.
///
/// `definition` must be a JSON object produced by serialising the domain
/// `WorkflowDefinition` type from the `orchestrator` crate.
pub async fn create_workflow(pool: &PgPool, row: &WorkflowRow) -> Result<WorkflowRow, DbError> {
    let inserted = sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflows (id, name, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        RETURNING id, name, definition, created_at, updated_at
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.definition)
    .bind(row.created_at)
    .bind(row.updated_at)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::AlreadyExists)?;

    Ok(inserted)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, definition, created_at, updated_at FROM workflows WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows in insertion order.
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, definition, created_at, updated_at FROM workflows ORDER BY seq ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
