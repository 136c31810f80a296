//! JSON-over-HTTP client for the Execution Engine.
//!
//! Responses may come bare or wrapped in a `{success, data, error}` envelope;
//! both are accepted.  Error text from `error`, `detail` or `message` is
//! passed through verbatim so callers see what the engine said.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::debug;

use super::{EngineSnapshot, ExecutionEngine, SubmitRequest, UpstreamError};

/// Reqwest-backed [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct HttpEngine {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SubmitAck {
    execution_id: String,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http_client,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fail on a non-2xx answer; otherwise hand back the body, if it is JSON.
    async fn checked_body(response: reqwest::Response) -> Result<Option<Value>, UpstreamError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if !status.is_success() {
            let message = body
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| fallback_message(status, &bytes));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
        let body = Self::checked_body(response)
            .await?
            .ok_or_else(|| UpstreamError::Decode("response body is not JSON".into()))?;
        let payload = unwrap_envelope(body)?;
        serde_json::from_value(payload).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Any 2xx counts as an ack, including an empty body, unless it carries
    /// a `success: false` envelope.
    async fn acknowledge(response: reqwest::Response) -> Result<(), UpstreamError> {
        match Self::checked_body(response).await? {
            Some(body) => unwrap_envelope(body).map(drop),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, UpstreamError> {
        debug!(workflow_id = %request.workflow_id, "submitting workflow to engine");
        let response = self
            .http_client
            .post(self.url("/workflow/execute"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let ack: SubmitAck = Self::read(response).await?;
        Ok(ack.execution_id)
    }

    async fn status(&self, engine_execution_id: &str) -> Result<EngineSnapshot, UpstreamError> {
        let response = self
            .http_client
            .get(self.url(&format!("/execution/{engine_execution_id}/status")))
            .send()
            .await
            .map_err(transport)?;
        Self::read(response).await
    }

    async fn cancel(&self, engine_execution_id: &str) -> Result<(), UpstreamError> {
        debug!(engine_execution_id, "requesting cancel from engine");
        let response = self
            .http_client
            .post(self.url(&format!("/execution/{engine_execution_id}/cancel")))
            .send()
            .await
            .map_err(transport)?;
        Self::acknowledge(response).await
    }
}

// ---------------------------------------------------------------------------
// Envelope handling
// ---------------------------------------------------------------------------

fn transport(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport(err.to_string())
}

/// Strip a `{success, data, error}` envelope if present.
fn unwrap_envelope(body: Value) -> Result<Value, UpstreamError> {
    let Value::Object(mut map) = body else {
        return Ok(body);
    };
    match map.get("success").and_then(Value::as_bool) {
        Some(false) => {
            let message = error_message(&Value::Object(map.clone()))
                .unwrap_or_else(|| "request was not successful".to_owned());
            Err(UpstreamError::Rejected(message))
        }
        Some(true) => Ok(map.remove("data").unwrap_or(Value::Null)),
        None => Ok(Value::Object(map)),
    }
}

/// First of `error`, `detail`, `message` that carries text.
fn error_message(body: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .filter_map(|key| body.get(key))
        .find_map(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            Value::Null => None,
            other => Some(other.to_string()),
        })
}

fn fallback_message(status: StatusCode, bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes).trim().to_owned();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_owned()
    } else {
        text
    }
}
