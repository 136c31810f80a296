use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use orchestrator::{WorkflowDefinition, WorkflowTemplate};

use crate::{envelope::Envelope, error::ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Json<Envelope<Vec<WorkflowTemplate>>> {
    Json(Envelope::list(state.templates.list_templates()))
}

pub async fn instantiate(
    Path(template_id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Envelope<WorkflowDefinition>>), ApiError> {
    let definition = state
        .templates
        .instantiate(&template_id, &state.repository)
        .await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(definition))))
}
