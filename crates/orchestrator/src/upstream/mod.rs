//! The seam between the coordinator and the external Execution Engine.
//!
//! The engine runs node logic and reports progress; the orchestrator only
//! submits, polls and cancels.  [`HttpEngine`] talks to a real engine over
//! JSON/HTTP, [`MockEngine`] is an in-process test double.

pub mod http;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use db::models::{ExecutionStatus, NewLogEntry};

use crate::models::WorkflowDefinition;

pub use http::HttpEngine;
pub use mock::{MockBehaviour, MockEngine};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Operations the coordinator needs from an Execution Engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Hand a workflow run to the engine.  Returns the engine's id for it.
    async fn submit(&self, request: &SubmitRequest) -> Result<String, UpstreamError>;

    /// Current state of a run previously accepted by `submit`.
    async fn status(&self, engine_execution_id: &str) -> Result<EngineSnapshot, UpstreamError>;

    /// Ask the engine to stop a run.  Success means the request was accepted,
    /// not that the run has stopped.
    async fn cancel(&self, engine_execution_id: &str) -> Result<(), UpstreamError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    /// Connection refused, reset, DNS failure, ...
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx answer.  `message` is the engine's own error text.
    #[error("engine returned {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx answer whose envelope carried `success: false`.
    #[error("engine rejected the request: {0}")]
    Rejected(String),

    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("could not decode engine response: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /workflow/execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitRequest {
    pub workflow_id: Uuid,
    pub input_data: Value,
    /// The full definition with schema defaults applied to every node.
    pub workflow: WorkflowDefinition,
}

/// Status values an engine may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl EngineStatus {
    /// The execution status this report moves a record to, if any.
    /// A paused run is still running from the orchestrator's point of view.
    pub fn target(self) -> Option<ExecutionStatus> {
        match self {
            Self::Running | Self::Paused => Some(ExecutionStatus::Running),
            Self::Completed => Some(ExecutionStatus::Completed),
            Self::Failed => Some(ExecutionStatus::Failed),
            Self::Cancelled => Some(ExecutionStatus::Cancelled),
            Self::Pending | Self::Unknown => None,
        }
    }
}

/// One entry of the engine's execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineLogEntry {
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EngineLogEntry {
    /// Entries without a usable timestamp are stamped with `now`.
    pub(crate) fn into_new_entry(self, now: DateTime<Utc>) -> NewLogEntry {
        NewLogEntry {
            node_name: if self.node_name.is_empty() {
                self.node_id.clone()
            } else {
                self.node_name
            },
            node_id: self.node_id,
            status: self.status,
            result: self.result,
            error: self.error,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

/// Answer of `GET /execution/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub status: EngineStatus,
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub output_data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub end_time: Option<DateTime<Utc>>,
    /// The complete log so far, oldest first.
    #[serde(default)]
    pub execution_log: Vec<EngineLogEntry>,
}

impl EngineSnapshot {
    pub fn new(status: EngineStatus) -> Self {
        Self {
            status,
            current_node: None,
            output_data: None,
            error: None,
            end_time: None,
            execution_log: Vec::new(),
        }
    }
}

/// Accepts RFC 3339 timestamps and offset-less ISO 8601 ones (read as UTC).
/// Anything else becomes `None`.
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn snapshot_accepts_naive_and_offset_timestamps() {
        let snapshot: EngineSnapshot = serde_json::from_value(json!({
            "status": "completed",
            "end_time": "2024-08-01T12:00:05.250000",
            "execution_log": [
                { "node_id": "input", "node_name": "Input", "status": "completed",
                  "timestamp": "2024-08-01T12:00:01+00:00" },
                { "node_id": "writer", "status": "completed", "timestamp": "yesterday-ish" }
            ]
        }))
        .unwrap();

        let end = snapshot.end_time.unwrap();
        assert_eq!(end.timestamp_subsec_millis(), 250);
        assert_eq!(
            snapshot.execution_log[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 1).unwrap())
        );
        assert_eq!(snapshot.execution_log[1].timestamp, None);
    }

    #[test]
    fn unknown_statuses_do_not_move_the_record() {
        let snapshot: EngineSnapshot =
            serde_json::from_value(json!({ "status": "warming_up" })).unwrap();
        assert_eq!(snapshot.status, EngineStatus::Unknown);
        assert_eq!(snapshot.status.target(), None);
        assert_eq!(EngineStatus::Paused.target(), Some(ExecutionStatus::Running));
    }

    #[test]
    fn nameless_log_entries_fall_back_to_the_node_id() {
        let now = Utc::now();
        let entry = EngineLogEntry {
            node_id: "writer".into(),
            node_name: String::new(),
            status: "completed".into(),
            result: None,
            error: None,
            timestamp: None,
        }
        .into_new_entry(now);
        assert_eq!(entry.node_name, "writer");
        assert_eq!(entry.timestamp, now);
    }
}
