//! Storage seams used by the orchestrator.
//!
//! Two backends implement these traits: [`crate::memory::MemoryStore`]
//! (the default, also used in tests) and [`crate::pg::PgStore`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionPatch, ExecutionRecord, ExecutionRow, ExecutionStatus, WorkflowRow},
};

/// Persistence for workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new row.  Fails with [`DbError::AlreadyExists`] if the id is taken.
    async fn insert_workflow(&self, row: WorkflowRow) -> Result<WorkflowRow, DbError>;

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError>;

    /// All rows in insertion order.
    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError>;

    /// Returns [`DbError::NotFound`] if no row was deleted.
    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError>;
}

/// Persistence for workflow executions and their logs.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, row: ExecutionRow) -> Result<ExecutionRecord, DbError>;

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionRecord, DbError>;

    /// Execution rows (without logs) for one workflow, oldest first.
    async fn list_workflow_executions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<ExecutionRow>, DbError>;

    /// Apply `patch` only if the row's status is one of `allowed_from`.
    ///
    /// Updates to the same execution are serialised.  Returns
    /// [`DbError::StatusConflict`] when the status check fails.
    async fn update_execution(
        &self,
        id: Uuid,
        allowed_from: &[ExecutionStatus],
        patch: ExecutionPatch,
    ) -> Result<ExecutionRecord, DbError>;
}
