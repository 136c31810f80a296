//! Orchestrator-level error types.

use thiserror::Error;
use uuid::Uuid;

use db::{models::ExecutionStatus, DbError};
use nodes::ConfigError;

use crate::upstream::UpstreamError;

/// A candidate workflow graph was rejected.  Nothing is persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workflow name must not be empty")]
    EmptyName,

    #[error("workflow must contain at least one node")]
    EmptyGraph,

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("node '{node_id}' has invalid config: {source}")]
    InvalidConfig {
        node_id: String,
        #[source]
        source: ConfigError,
    },

    /// The first cycle found, as the node ids along it in edge order.
    #[error("workflow graph contains a cycle: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
}

/// Errors produced by the repository, the template catalog and the
/// execution coordinator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown template, workflow or execution id.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The requested action is illegal in the execution's current status.
    #[error("cannot {action} execution {execution_id}: status is {status}")]
    InvalidState {
        execution_id: Uuid,
        status: ExecutionStatus,
        action: &'static str,
    },

    /// The Execution Engine was unreachable or answered with an error.
    /// Retryable by the caller.
    #[error("execution engine unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// A stored row could not be turned back into a domain value.
    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Map a store error, turning `DbError::NotFound` into a typed not-found.
    pub(crate) fn from_db(err: DbError, kind: &'static str, id: impl ToString) -> Self {
        match err {
            DbError::NotFound => Self::not_found(kind, id),
            other => Self::Database(other),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::CorruptRecord(err.to_string())
    }
}
