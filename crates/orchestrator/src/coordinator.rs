//! Execution lifecycle.
//!
//! `ExecutionCoordinator` owns every `WorkflowExecution`:
//! 1. `execute` submits a stored definition to the Execution Engine and only
//!    then records a Pending execution.
//! 2. `status` polls the engine for non-terminal executions and applies the
//!    reported transition with a conditional store update.
//! 3. `cancel` asks the engine to stop a run and records the request; the
//!    Cancelled state arrives through a later `status`.
//!
//! Engine calls run under `engine_timeout` and never hold a store lock.
//!
//! ```text
//! Pending ──▶ Running ──▶ Completed
//!    │           │
//!    └─────┬─────┘
//!          ▼
//!   Failed / Cancelled
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::{
    DbError, ExecutionStore,
    models::{ExecutionPatch, ExecutionRow, ExecutionStatus},
};

use crate::{
    EngineError,
    models::{ExecutionResult, WorkflowExecution, WorkflowStats},
    repository::WorkflowRepository,
    upstream::{EngineSnapshot, ExecutionEngine, SubmitRequest, UpstreamError},
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on any single Execution Engine call.
    pub engine_timeout: Duration,
    /// Delay between consecutive submissions of a batch.
    pub batch_pacing: Duration,
    /// How often `wait_for_completion` polls.
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(30),
            batch_pacing: Duration::from_millis(250),
            poll_interval: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub workflow_id: Uuid,
    #[serde(default)]
    pub input_data: Value,
}

/// Per-item outcome of `execute_batch`.  Exactly one of `execution_id` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub workflow_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ExecutionCoordinator
// ---------------------------------------------------------------------------

pub struct ExecutionCoordinator {
    workflows: WorkflowRepository,
    executions: Arc<dyn ExecutionStore>,
    engine: Arc<dyn ExecutionEngine>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        workflows: WorkflowRepository,
        executions: Arc<dyn ExecutionStore>,
        engine: Arc<dyn ExecutionEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            workflows,
            executions,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Submit a stored workflow to the engine and record a Pending execution.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the workflow does not exist.
    /// - [`EngineError::UpstreamUnavailable`] if the engine refused or timed
    ///   out.  No execution is recorded in that case.
    #[instrument(skip(self, input_data))]
    pub async fn execute(&self, workflow_id: Uuid, input_data: Value) -> Result<Uuid, EngineError> {
        let definition = self.workflows.get(workflow_id).await?;
        let request = SubmitRequest {
            workflow_id,
            input_data: input_data.clone(),
            workflow: definition.with_effective_configs(self.workflows.registry()),
        };

        let engine_execution_id = self
            .call(self.engine.submit(&request))
            .await
            .inspect_err(|e| warn!("engine refused workflow: {e}"))?;

        let row = ExecutionRow {
            id: Uuid::new_v4(),
            workflow_id,
            engine_execution_id: engine_execution_id.clone(),
            status: ExecutionStatus::Pending.to_string(),
            current_node: None,
            input_data,
            output_data: None,
            error: None,
            cancel_requested: false,
            started_at: Utc::now(),
            finished_at: None,
        };

        match self.executions.insert_execution(row).await {
            Ok(record) => {
                info!(execution_id = %record.row.id, %engine_execution_id, "execution submitted");
                Ok(record.row.id)
            }
            Err(err) => {
                warn!(
                    "could not record execution, cancelling engine run {engine_execution_id}: {err}"
                );
                let cancelled = self.call(self.engine.cancel(&engine_execution_id)).await;
                if let Err(cancel_err) = cancelled {
                    warn!("orphaned engine run {engine_execution_id}: {cancel_err}");
                }
                Err(err.into())
            }
        }
    }

    /// Current snapshot, refreshed from the engine unless already terminal.
    #[instrument(skip(self))]
    pub async fn status(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let current = self.load(execution_id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        let snapshot = self
            .call(self.engine.status(&current.engine_execution_id))
            .await?;
        let patch = patch_from_snapshot(snapshot, Utc::now());
        let reported = patch.status;

        match self
            .executions
            .update_execution(execution_id, &ExecutionStatus::ACTIVE, patch)
            .await
        {
            Ok(record) => {
                let updated = WorkflowExecution::try_from(record)?;
                if updated.status != current.status {
                    info!(from = %current.status, to = %updated.status, "execution transitioned");
                }
                Ok(updated)
            }
            // Another caller moved it to a terminal state first.
            Err(DbError::StatusConflict { current: stored }) => {
                info!(?reported, %stored, "execution already settled");
                self.load(execution_id).await
            }
            Err(err) => Err(EngineError::from_db(err, "execution", execution_id)),
        }
    }

    /// Ask the engine to cancel a Pending or Running execution.
    ///
    /// On success the execution carries `cancel_requested`; it becomes
    /// Cancelled once a later [`status`](Self::status) sees the engine
    /// confirm it.
    #[instrument(skip(self))]
    pub async fn cancel(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let current = self.load(execution_id).await?;
        if current.status.is_terminal() {
            return Err(EngineError::InvalidState {
                execution_id,
                status: current.status,
                action: "cancel",
            });
        }

        self.call(self.engine.cancel(&current.engine_execution_id))
            .await?;

        let patch = ExecutionPatch {
            cancel_requested: Some(true),
            ..ExecutionPatch::default()
        };
        match self
            .executions
            .update_execution(execution_id, &ExecutionStatus::ACTIVE, patch)
            .await
        {
            Ok(record) => {
                info!("cancel requested");
                WorkflowExecution::try_from(record)
            }
            Err(DbError::StatusConflict { current }) => Err(EngineError::InvalidState {
                execution_id,
                status: current.parse().map_err(EngineError::CorruptRecord)?,
                action: "cancel",
            }),
            Err(err) => Err(EngineError::from_db(err, "execution", execution_id)),
        }
    }

    /// Output of a Completed execution.
    pub async fn result(&self, execution_id: Uuid) -> Result<ExecutionResult, EngineError> {
        let execution = self.status(execution_id).await?;
        if execution.status != ExecutionStatus::Completed {
            return Err(EngineError::InvalidState {
                execution_id,
                status: execution.status,
                action: "read the result of",
            });
        }
        Ok(execution.into())
    }

    /// Poll every `poll_interval` until the execution is terminal or
    /// `timeout` has passed; returns the latest snapshot either way.
    #[instrument(skip(self))]
    pub async fn wait_for_completion(
        &self,
        execution_id: Uuid,
        timeout: Duration,
    ) -> Result<WorkflowExecution, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let execution = self.status(execution_id).await?;
            if execution.status.is_terminal() {
                return Ok(execution);
            }
            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                warn!(status = %execution.status, "gave up waiting for execution");
                return Ok(execution);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run statistics from stored executions.  Executions outlive their
    /// definition, so a deleted workflow still reports its history; an id
    /// that was never stored and never ran is NotFound.
    #[instrument(skip(self))]
    pub async fn stats(&self, workflow_id: Uuid) -> Result<WorkflowStats, EngineError> {
        let rows = self
            .executions
            .list_workflow_executions(workflow_id)
            .await
            .map_err(|e| EngineError::from_db(e, "workflow", workflow_id))?;
        if rows.is_empty() {
            self.workflows.get(workflow_id).await?;
        }
        WorkflowStats::from_rows(workflow_id, &rows)
    }

    /// Submit each request in order, `batch_pacing` apart.  One failure does
    /// not stop the rest.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn execute_batch(&self, requests: Vec<ExecuteRequest>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());

        for (i, request) in requests.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_pacing).await;
            }
            let workflow_id = request.workflow_id;
            let outcome = match self.execute(workflow_id, request.input_data).await {
                Ok(execution_id) => BatchOutcome {
                    workflow_id,
                    execution_id: Some(execution_id),
                    error: None,
                },
                Err(err) => BatchOutcome {
                    workflow_id,
                    execution_id: None,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(failed, "batch submitted");
        outcomes
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn load(&self, execution_id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let record = self
            .executions
            .get_execution(execution_id)
            .await
            .map_err(|e| EngineError::from_db(e, "execution", execution_id))?;
        WorkflowExecution::try_from(record)
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, UpstreamError> {
        let limit = self.config.engine_timeout;
        tokio::time::timeout(limit, request)
            .await
            .map_err(|_| UpstreamError::Timeout(limit))?
    }
}

/// Turn an engine report into a store patch.  Terminal reports stamp
/// `finished_at` with the engine's end time, or `now` if it sent none.
fn patch_from_snapshot(snapshot: EngineSnapshot, now: DateTime<Utc>) -> ExecutionPatch {
    let status = snapshot.status.target();
    let finished_at = status
        .filter(|s| s.is_terminal())
        .map(|_| snapshot.end_time.unwrap_or(now));

    ExecutionPatch {
        status,
        current_node: snapshot.current_node,
        output_data: snapshot.output_data,
        error: snapshot.error,
        cancel_requested: None,
        finished_at,
        log: snapshot
            .execution_log
            .into_iter()
            .map(|entry| entry.into_new_entry(now))
            .collect(),
    }
}
