//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use orchestrator::EngineError;

use crate::envelope::Envelope;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path, query or body.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(err) => match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::InvalidState { .. } => StatusCode::CONFLICT,
                EngineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
                EngineError::Database(_) | EngineError::CorruptRecord(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {self}");
        } else {
            warn!(%status, "request rejected: {self}");
        }
        (status, Json(Envelope::<()>::failure(self.to_string()))).into_response()
    }
}
