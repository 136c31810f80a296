//! Postgres-backed store, delegating to the [`crate::repository`] functions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError, DbPool,
    models::{ExecutionPatch, ExecutionRecord, ExecutionRow, ExecutionStatus, WorkflowRow},
    repository::{executions, workflows},
    store::{ExecutionStore, WorkflowStore},
};

/// Implements both store traits on top of a shared [`DbPool`].
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn insert_workflow(&self, row: WorkflowRow) -> Result<WorkflowRow, DbError> {
        workflows::create_workflow(&self.pool, &row).await
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        workflows::get_workflow(&self.pool, id).await
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        workflows::list_workflows(&self.pool).await
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError> {
        workflows::delete_workflow(&self.pool, id).await
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn insert_execution(&self, row: ExecutionRow) -> Result<ExecutionRecord, DbError> {
        let row = executions::create_execution(&self.pool, &row).await?;
        Ok(ExecutionRecord { row, log: Vec::new() })
    }

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionRecord, DbError> {
        executions::get_execution(&self.pool, id).await
    }

    async fn list_workflow_executions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        executions::list_executions_by_workflow(&self.pool, workflow_id).await
    }

    async fn update_execution(
        &self,
        id: Uuid,
        allowed_from: &[ExecutionStatus],
        patch: ExecutionPatch,
    ) -> Result<ExecutionRecord, DbError> {
        executions::update_execution(&self.pool, id, allowed_from, patch).await
    }
}
