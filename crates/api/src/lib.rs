//! `api` crate: HTTP REST API layer.
//!
//! Routes (all under `/api/v1/workflow` except `/health`):
//!   GET    /node-types
//!   GET    /templates
//!   POST   /templates/{template_id}/instantiate
//!   POST   /create
//!   GET    /list?page&limit
//!   GET    /{id}
//!   GET    /{id}/preview
//!   GET    /{id}/stats
//!   DELETE /{id}
//!   POST   /execute
//!   POST   /execute/batch
//!   GET    /execution/{id}/status
//!   GET    /execution/{id}/result?wait_secs
//!   POST   /execution/{id}/cancel
//!
//! Every response body is an [`envelope::Envelope`].

pub mod envelope;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use orchestrator::{ExecutionCoordinator, TemplateCatalog, WorkflowRepository};

use handlers::{executions, node_types, templates, workflows};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repository: WorkflowRepository,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub templates: Arc<TemplateCatalog>,
}

impl AppState {
    pub fn new(repository: WorkflowRepository, coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self {
            repository,
            coordinator,
            templates: Arc::new(TemplateCatalog::builtin()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let workflow = Router::new()
        .route("/node-types", get(node_types::list))
        .route("/templates", get(templates::list))
        .route(
            "/templates/:template_id/instantiate",
            post(templates::instantiate),
        )
        .route("/create", post(workflows::create))
        .route("/list", get(workflows::list))
        .route("/execute", post(executions::execute))
        .route("/execute/batch", post(executions::execute_batch))
        .route("/execution/:id/status", get(executions::status))
        .route("/execution/:id/result", get(executions::result))
        .route("/execution/:id/cancel", post(executions::cancel))
        .route("/:id", get(workflows::get).delete(workflows::delete))
        .route("/:id/preview", get(workflows::preview))
        .route("/:id/stats", get(workflows::stats));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/workflow", workflow)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind `bind` and serve until Ctrl-C.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod router_tests;
