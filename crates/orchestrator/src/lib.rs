//! `orchestrator` crate: workflow models, DAG validation, templates, the
//! workflow repository and the execution coordinator.

pub mod coordinator;
pub mod dag;
pub mod error;
pub mod models;
pub mod repository;
pub mod templates;
pub mod upstream;

pub use coordinator::{BatchOutcome, CoordinatorConfig, ExecuteRequest, ExecutionCoordinator};
pub use dag::validate_graph;
pub use error::{EngineError, ValidationError};
pub use models::{
    ExecutionLogEntry, ExecutionResult, NewWorkflow, WorkflowDefinition, WorkflowEdge,
    WorkflowExecution, WorkflowNode, WorkflowPreview, WorkflowStats, WorkflowSummary,
};
pub use repository::{Page, PageRequest, WorkflowRepository};
pub use templates::{TemplateCatalog, WorkflowTemplate};
pub use upstream::{ExecutionEngine, HttpEngine, MockEngine, UpstreamError};

#[cfg(test)]
mod coordinator_tests;
