//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; they carry no domain behaviour.
//! Domain types live in the `orchestrator` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (nodes, edges, variables, metadata, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Statuses a live execution can still leave.
    pub const ACTIVE: [ExecutionStatus; 2] = [Self::Pending, Self::Running];

    /// Completed, Failed and Cancelled accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted workflow execution row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    /// Weak reference: the workflow may be deleted after submission.
    pub workflow_id: Uuid,
    /// Id the Execution Engine assigned when the run was submitted.
    pub engine_execution_id: String,
    pub status: String,
    pub current_node: Option<String>,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set once a cancel request has been accepted by the engine.
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRow {
    /// Parsed status.  Rows are only ever written from `ExecutionStatus`
    /// values, so an unparsable status means the table was edited by hand.
    pub fn parsed_status(&self) -> Result<ExecutionStatus, String> {
        self.status.parse()
    }
}

// ---------------------------------------------------------------------------
// execution_log
// ---------------------------------------------------------------------------

/// A persisted execution log entry.  Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExecutionLogRow {
    pub execution_id: Uuid,
    /// Position in the log, starting at 0.
    pub seq: i64,
    pub node_id: String,
    pub node_name: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    #[sqlx(rename = "logged_at")]
    pub timestamp: DateTime<Utc>,
}

/// A log entry as reported upstream, before it is given a position.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub node_id: String,
    pub node_name: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An execution row together with its ordered log.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub row: ExecutionRow,
    pub log: Vec<ExecutionLogRow>,
}

// ---------------------------------------------------------------------------
// Conditional updates
// ---------------------------------------------------------------------------

/// Changes applied to an execution row by a single conditional update.
///
/// `None` fields are left untouched.  `log` is the *complete* log as reported
/// by the engine: entries past the ones already stored are appended, earlier
/// ones are ignored, so replaying the same report twice is harmless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub current_node: Option<String>,
    pub output_data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub cancel_requested: Option<bool>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<NewLogEntry>,
}

/// Turn the unseen tail of `reported` into rows, starting at position
/// `stored_len`.  Timestamps are clamped so the log never goes backwards.
pub(crate) fn append_rows(
    execution_id: Uuid,
    stored_len: usize,
    last_timestamp: Option<DateTime<Utc>>,
    reported: &[NewLogEntry],
) -> Vec<ExecutionLogRow> {
    let mut floor = last_timestamp;
    reported
        .iter()
        .enumerate()
        .skip(stored_len)
        .map(|(seq, entry)| {
            let timestamp = match floor {
                Some(prev) if entry.timestamp < prev => prev,
                _ => entry.timestamp,
            };
            floor = Some(timestamp);
            ExecutionLogRow {
                execution_id,
                seq: seq as i64,
                node_id: entry.node_id.clone(),
                node_name: entry.node_name.clone(),
                status: entry.status.clone(),
                result: entry.result.clone(),
                error: entry.error.clone(),
                timestamp,
            }
        })
        .collect()
}
