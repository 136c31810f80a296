use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use orchestrator::{BatchOutcome, ExecuteRequest, ExecutionResult, WorkflowExecution};

use super::{body, parse_id};
use crate::{envelope::Envelope, error::ApiError, AppState};

/// Longest a `/result` request may block waiting for completion.
pub const MAX_RESULT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct ExecuteBatchDto {
    pub requests: Vec<ExecuteRequest>,
}

/// `?wait_secs=N` on the result endpoint: block until the execution is
/// terminal or `N` seconds pass (capped at [`MAX_RESULT_WAIT`]).
#[derive(Debug, Default, Deserialize)]
pub struct ResultParams {
    pub wait_secs: Option<u64>,
}

pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let ExecuteRequest {
        workflow_id,
        input_data,
    } = body(payload)?;
    let execution_id = state.coordinator.execute(workflow_id, input_data).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::ok(json!({
            "execution_id": execution_id,
            "workflow_id": workflow_id,
            "status": "pending",
        }))),
    ))
}

pub async fn execute_batch(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteBatchDto>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Vec<BatchOutcome>>>), ApiError> {
    let batch = body(payload)?;
    if batch.requests.is_empty() {
        return Err(ApiError::BadRequest(
            "batch must contain at least one request".into(),
        ));
    }
    let outcomes = state.coordinator.execute_batch(batch.requests).await;
    Ok((StatusCode::ACCEPTED, Json(Envelope::list(outcomes))))
}

pub async fn status(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Envelope<WorkflowExecution>>, ApiError> {
    let execution = state.coordinator.status(parse_id(&id)?).await?;
    Ok(Json(Envelope::ok(execution)))
}

pub async fn result(
    Path(id): Path<String>,
    State(state): State<AppState>,
    params: Result<Query<ResultParams>, QueryRejection>,
) -> Result<Json<Envelope<ExecutionResult>>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let id = parse_id(&id)?;
    if let Some(secs) = params.wait_secs.filter(|&secs| secs > 0) {
        let timeout = Duration::from_secs(secs).min(MAX_RESULT_WAIT);
        state.coordinator.wait_for_completion(id, timeout).await?;
    }
    let result = state.coordinator.result(id).await?;
    Ok(Json(Envelope::ok(result)))
}

pub async fn cancel(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Envelope<WorkflowExecution>>), ApiError> {
    let execution = state.coordinator.cancel(parse_id(&id)?).await?;
    Ok((StatusCode::ACCEPTED, Json(Envelope::ok(execution))))
}
