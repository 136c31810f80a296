//! In-process store backed by tokio locks.
//!
//! The workflow table sits behind one `RwLock`; listing copies a snapshot so
//! readers never hold the lock while the caller works.  Each execution lives
//! behind its own `Mutex`, so transitions on one execution never wait on
//! another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::{
    DbError,
    models::{
        append_rows, ExecutionPatch, ExecutionRecord, ExecutionRow, ExecutionStatus, WorkflowRow,
    },
    store::{ExecutionStore, WorkflowStore},
};

#[derive(Default)]
struct WorkflowTable {
    order: Vec<Uuid>,
    rows: HashMap<Uuid, WorkflowRow>,
}

/// Memory-backed implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<WorkflowTable>,
    executions: RwLock<HashMap<Uuid, Arc<Mutex<ExecutionRecord>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of executions ever recorded.
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    async fn execution_slot(&self, id: Uuid) -> Result<Arc<Mutex<ExecutionRecord>>, DbError> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DbError::NotFound)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_workflow(&self, row: WorkflowRow) -> Result<WorkflowRow, DbError> {
        let mut table = self.workflows.write().await;
        if table.rows.contains_key(&row.id) {
            return Err(DbError::AlreadyExists);
        }
        table.order.push(row.id);
        table.rows.insert(row.id, row.clone());
        debug!("stored workflow {}", row.id);
        Ok(row)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        self.workflows
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        let table = self.workflows.read().await;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError> {
        let mut table = self.workflows.write().await;
        if table.rows.remove(&id).is_none() {
            return Err(DbError::NotFound);
        }
        table.order.retain(|existing| *existing != id);
        debug!("deleted workflow {id}");
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_execution(&self, row: ExecutionRow) -> Result<ExecutionRecord, DbError> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&row.id) {
            return Err(DbError::AlreadyExists);
        }
        let record = ExecutionRecord { row, log: Vec::new() };
        executions.insert(record.row.id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionRecord, DbError> {
        let slot = self.execution_slot(id).await?;
        let record = slot.lock().await;
        Ok(record.clone())
    }

    async fn list_workflow_executions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        let slots: Vec<_> = self.executions.read().await.values().cloned().collect();
        let mut rows = Vec::new();
        for slot in slots {
            let record = slot.lock().await;
            if record.row.workflow_id == workflow_id {
                rows.push(record.row.clone());
            }
        }
        rows.sort_by_key(|row| (row.started_at, row.id));
        Ok(rows)
    }

    async fn update_execution(
        &self,
        id: Uuid,
        allowed_from: &[ExecutionStatus],
        patch: ExecutionPatch,
    ) -> Result<ExecutionRecord, DbError> {
        let slot = self.execution_slot(id).await?;
        let mut record = slot.lock().await;

        let allowed = record
            .row
            .parsed_status()
            .map(|current| allowed_from.contains(&current))
            .unwrap_or(false);
        if !allowed {
            return Err(DbError::StatusConflict {
                current: record.row.status.clone(),
            });
        }

        let ExecutionPatch {
            status,
            current_node,
            output_data,
            error,
            cancel_requested,
            finished_at,
            log,
        } = patch;

        let row = &mut record.row;
        if let Some(status) = status {
            row.status = status.to_string();
        }
        if current_node.is_some() {
            row.current_node = current_node;
        }
        if output_data.is_some() {
            row.output_data = output_data;
        }
        if error.is_some() {
            row.error = error;
        }
        if let Some(flag) = cancel_requested {
            row.cancel_requested = flag;
        }
        if finished_at.is_some() {
            row.finished_at = finished_at;
        }

        let last = record.log.last().map(|entry| entry.timestamp);
        let appended = append_rows(id, record.log.len(), last, &log);
        record.log.extend(appended);

        Ok(record.clone())
    }
}
