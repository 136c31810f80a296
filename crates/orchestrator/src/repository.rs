//! Workflow definition CRUD and paginated listing.
//!
//! `WorkflowRepository` is the only writer of definitions.  Every create goes
//! through [`validate_graph`], so nothing unvalidated is ever persisted.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::WorkflowStore;
use nodes::NodeTypeRegistry;

use crate::{
    EngineError, ValidationError,
    dag::validate_graph,
    models::{NewWorkflow, WorkflowDefinition, WorkflowPreview},
};

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// A clamped page request: `page >= 1`, `1 <= limit <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    limit: usize,
}

impl PageRequest {
    /// Missing values take their defaults (page 1, limit 10); out-of-range
    /// values clamp to the nearest bound.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1) as usize;
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
            .clamp(1, MAX_PAGE_LIMIT as i64) as usize;
        Self { page, limit }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a listing plus the metadata needed to navigate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// Slice `items` to `[(page-1)*limit, min(page*limit, total))`.  A page past
/// the end is empty, never an error.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let PageRequest { page, limit } = request;
    let start = (page - 1).saturating_mul(limit);
    let total_pages = total.div_ceil(limit);

    Page {
        items: items.into_iter().skip(start).take(limit).collect(),
        total,
        page,
        limit,
        total_pages,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository
// ---------------------------------------------------------------------------

/// Validated persistence of workflow definitions over a [`WorkflowStore`].
#[derive(Clone)]
pub struct WorkflowRepository {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<NodeTypeRegistry>,
}

impl WorkflowRepository {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<NodeTypeRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    /// Check a candidate without storing it.  Returns the topological order.
    pub fn validate(&self, new: &NewWorkflow) -> Result<Vec<String>, ValidationError> {
        if new.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if new.nodes.is_empty() {
            return Err(ValidationError::EmptyGraph);
        }
        validate_graph(&self.registry, &new.nodes, &new.edges)
    }

    /// Validate, assign a fresh id and timestamps, and persist.
    #[instrument(skip(self, new), fields(name = %new.name, nodes = new.nodes.len()))]
    pub async fn create(&self, new: NewWorkflow) -> Result<WorkflowDefinition, EngineError> {
        if let Err(err) = self.validate(&new) {
            warn!("rejected workflow: {err}");
            return Err(err.into());
        }

        let definition = WorkflowDefinition::from_new(new, Uuid::new_v4(), Utc::now());
        self.store.insert_workflow(definition.to_row()?).await?;

        info!(workflow_id = %definition.id, "workflow created");
        Ok(definition)
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, EngineError> {
        let row = self
            .store
            .get_workflow(id)
            .await
            .map_err(|e| EngineError::from_db(e, "workflow", id))?;
        WorkflowDefinition::from_row(row)
    }

    /// Every stored definition, in insertion order.
    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        self.store
            .list_workflows()
            .await?
            .into_iter()
            .map(WorkflowDefinition::from_row)
            .collect()
    }

    pub async fn list_page(
        &self,
        request: PageRequest,
    ) -> Result<Page<WorkflowDefinition>, EngineError> {
        Ok(paginate(self.list().await?, request))
    }

    /// Remove a definition.  Executions that reference it are unaffected.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        self.store
            .delete_workflow(id)
            .await
            .map_err(|e| EngineError::from_db(e, "workflow", id))?;
        info!("workflow deleted");
        Ok(())
    }

    pub async fn preview(&self, id: Uuid) -> Result<WorkflowPreview, EngineError> {
        Ok(self.get(id).await?.preview(&self.registry))
    }
}
