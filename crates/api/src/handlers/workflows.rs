use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use orchestrator::{
    NewWorkflow, PageRequest, WorkflowDefinition, WorkflowPreview, WorkflowStats, WorkflowSummary,
};

use super::{body, parse_id};
use crate::{envelope::Envelope, error::ApiError, AppState};

/// Query string of the list endpoint.  Values that are not integers are
/// treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListParams {
    fn request(&self) -> PageRequest {
        let parse = |raw: &Option<String>| {
            raw.as_deref().and_then(|v| v.trim().parse::<i64>().ok())
        };
        PageRequest::new(parse(&self.page), parse(&self.limit))
    }
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewWorkflow>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<WorkflowDefinition>>), ApiError> {
    let new = body(payload)?;
    let definition = state.repository.create(new).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(definition))))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Envelope<Vec<WorkflowSummary>>>, ApiError> {
    let page = state.repository.list_page(params.request()).await?;
    Ok(Json(Envelope::page(page.map(|d| d.summary()))))
}

pub async fn get(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<WorkflowDefinition>>, ApiError> {
    let definition = state.repository.get(parse_id(&id)?).await?;
    Ok(Json(Envelope::ok(definition)))
}

pub async fn preview(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<WorkflowPreview>>, ApiError> {
    let preview = state.repository.preview(parse_id(&id)?).await?;
    Ok(Json(Envelope::ok(preview)))
}

/// Run statistics of one workflow.
pub async fn stats(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<WorkflowStats>>, ApiError> {
    let stats = state.coordinator.stats(parse_id(&id)?).await?;
    Ok(Json(Envelope::ok(stats)))
}

pub async fn delete(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let id = parse_id(&id)?;
    state.repository.delete(id).await?;
    Ok(Json(Envelope::ok(json!({ "id": id, "deleted": true }))))
}
