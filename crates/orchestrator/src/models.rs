//! Core domain models for the orchestrator.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory.  A [`WorkflowDefinition`] is serialised to/from the JSONB
//! `definition` column of the `workflows` table; a [`WorkflowExecution`] is
//! assembled from an execution row plus its log rows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::{ExecutionLogRow, ExecutionRecord, ExecutionRow, ExecutionStatus, WorkflowRow};
use nodes::{ConfigValue, NodeCategory, NodeConfig, NodeTypeRegistry};

use crate::EngineError;

// ---------------------------------------------------------------------------
// WorkflowNode / WorkflowEdge
// ---------------------------------------------------------------------------

/// Canvas position of a node in the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Must name a type registered in the `NodeTypeRegistry`.
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Checked against the node type's schema.
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub position: Position,
}

impl WorkflowNode {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: name.into(),
            description: String::new(),
            config: NodeConfig::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            position: Position::default(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.position = Position { x, y };
        self
    }
}

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

impl WorkflowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Variables / metadata
// ---------------------------------------------------------------------------

/// Workflow-level variables, typed the same way as node config values.
pub type Variables = BTreeMap<String, ConfigValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// Recognised workflow metadata.  Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// Set when the workflow was instantiated from a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from_template: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

fn default_version() -> String {
    "1.0".to_owned()
}

/// A candidate workflow, as submitted by a create request or drafted from
/// a template.  Becomes a [`WorkflowDefinition`] once validated and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl NewWorkflow {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<WorkflowNode>,
        edges: Vec<WorkflowEdge>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: default_version(),
            nodes,
            edges,
            variables: Variables::new(),
            metadata: WorkflowMetadata::default(),
        }
    }
}

/// A complete, validated workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub version: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub variables: Variables,
    pub metadata: WorkflowMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub(crate) fn from_new(new: NewWorkflow, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            version: new.version,
            nodes: new.nodes,
            edges: new.edges,
            variables: new.variables,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn to_row(&self) -> Result<WorkflowRow, EngineError> {
        Ok(WorkflowRow {
            id: self.id,
            name: self.name.clone(),
            definition: serde_json::to_value(self)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub(crate) fn from_row(row: WorkflowRow) -> Result<Self, EngineError> {
        Ok(serde_json::from_value(row.definition)?)
    }

    /// Copy of this definition with every node's schema defaults filled in.
    /// Nodes of unregistered types are copied unchanged.
    pub fn with_effective_configs(&self, registry: &NodeTypeRegistry) -> Self {
        let mut resolved = self.clone();
        for node in &mut resolved.nodes {
            if let Ok(descriptor) = registry.resolve(&node.node_type) {
                node.config = descriptor.effective_config(&node.config);
            }
        }
        resolved
    }

    /// Listing view without the graph itself.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            node_count: self.nodes.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            metadata: self.metadata.clone(),
        }
    }

    /// Size, categories, rough duration and complexity of the graph.
    pub fn preview(&self, registry: &NodeTypeRegistry) -> WorkflowPreview {
        let node_count = self.nodes.len();
        let edge_count = self.edges.len();

        let categories: BTreeSet<NodeCategory> = self
            .nodes
            .iter()
            .filter_map(|n| registry.resolve(&n.node_type).ok())
            .map(|d| d.category)
            .collect();

        let estimated_minutes = self
            .nodes
            .iter()
            .map(|n| match n.node_type.as_str() {
                "text_generation" | "platform_publish" => 1.0,
                "image_generation" => 2.0,
                "music_generation" => 3.0,
                "content_analysis" | "content_optimization" => 0.5,
                _ => 0.2,
            })
            .sum();

        let complexity = if node_count > 10 || edge_count > 15 {
            Complexity::Complex
        } else if node_count > 5 || edge_count > 8 {
            Complexity::Medium
        } else {
            Complexity::Simple
        };

        WorkflowPreview {
            workflow_id: self.id,
            node_count,
            edge_count,
            categories: categories.into_iter().collect(),
            estimated_minutes,
            complexity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub version: String,
    pub node_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: WorkflowMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPreview {
    pub workflow_id: Uuid,
    pub node_count: usize,
    pub edge_count: usize,
    pub categories: Vec<NodeCategory>,
    pub estimated_minutes: f64,
    pub complexity: Complexity,
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

/// One entry of an execution's log.  Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub node_id: String,
    pub node_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ExecutionLogRow> for ExecutionLogEntry {
    fn from(row: ExecutionLogRow) -> Self {
        Self {
            node_id: row.node_id,
            node_name: row.node_name,
            status: row.status,
            result: row.result,
            error: row.error,
            timestamp: row.timestamp,
        }
    }
}

/// Snapshot of one run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    /// Lookup-only reference; the definition may since have been deleted.
    pub workflow_id: Uuid,
    pub engine_execution_id: String,
    pub status: ExecutionStatus,
    pub current_node: Option<String>,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// A cancel request was accepted by the engine but not yet confirmed.
    pub cancel_requested: bool,
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl TryFrom<ExecutionRecord> for WorkflowExecution {
    type Error = EngineError;

    fn try_from(record: ExecutionRecord) -> Result<Self, Self::Error> {
        let ExecutionRecord { row, log } = record;
        let status = row.parsed_status().map_err(EngineError::CorruptRecord)?;
        Ok(Self {
            id: row.id,
            workflow_id: row.workflow_id,
            engine_execution_id: row.engine_execution_id,
            status,
            current_node: row.current_node,
            input_data: row.input_data,
            output_data: row.output_data,
            start_time: row.started_at,
            end_time: row.finished_at,
            error: row.error,
            cancel_requested: row.cancel_requested,
            execution_log: log.into_iter().map(ExecutionLogEntry::from).collect(),
        })
    }
}

/// Final output of a completed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub output_data: Option<Value>,
    /// Wall-clock seconds between submission and completion.
    pub execution_time: Option<f64>,
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl From<WorkflowExecution> for ExecutionResult {
    fn from(execution: WorkflowExecution) -> Self {
        let execution_time = execution
            .end_time
            .map(|end| (end - execution.start_time).num_milliseconds() as f64 / 1000.0);
        Self {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            status: execution.status,
            output_data: execution.output_data,
            execution_time,
            execution_log: execution.execution_log,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowStats
// ---------------------------------------------------------------------------

/// Aggregate run statistics for one workflow, computed from stored
/// executions without contacting the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub workflow_id: Uuid,
    pub total_executions: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    /// Pending or Running.
    pub active_runs: usize,
    /// Mean seconds from submission to completion over successful runs.
    pub average_duration: f64,
    /// Successful runs over finished runs, in `[0, 1]`.
    pub success_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl WorkflowStats {
    pub fn from_rows(workflow_id: Uuid, rows: &[ExecutionRow]) -> Result<Self, EngineError> {
        let mut stats = Self {
            workflow_id,
            total_executions: rows.len(),
            successful_runs: 0,
            failed_runs: 0,
            cancelled_runs: 0,
            active_runs: 0,
            average_duration: 0.0,
            success_rate: 0.0,
            last_execution: rows.iter().map(|row| row.started_at).max(),
        };

        let mut total_seconds = 0.0;
        let mut timed_runs = 0usize;
        for row in rows {
            match row.parsed_status().map_err(EngineError::CorruptRecord)? {
                ExecutionStatus::Completed => {
                    stats.successful_runs += 1;
                    if let Some(end) = row.finished_at {
                        total_seconds += (end - row.started_at).num_milliseconds() as f64 / 1000.0;
                        timed_runs += 1;
                    }
                }
                ExecutionStatus::Failed => stats.failed_runs += 1,
                ExecutionStatus::Cancelled => stats.cancelled_runs += 1,
                ExecutionStatus::Pending | ExecutionStatus::Running => stats.active_runs += 1,
            }
        }

        if timed_runs > 0 {
            stats.average_duration = total_seconds / timed_runs as f64;
        }
        let finished = stats.successful_runs + stats.failed_runs + stats.cancelled_runs;
        if finished > 0 {
            stats.success_rate = stats.successful_runs as f64 / finished as f64;
        }
        Ok(stats)
    }
}
