//! `MockEngine`: a test double for `ExecutionEngine`.
//!
//! Records every submission, hands out sequential engine ids and reports
//! whatever snapshot a test has scripted for each run.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{
    EngineLogEntry, EngineSnapshot, EngineStatus, ExecutionEngine, SubmitRequest, UpstreamError,
};

/// Behaviour injected into `MockEngine`; applies to every call.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Answer normally.
    Accept,
    /// Fail with a transport error carrying this message.
    Unavailable(String),
    /// Never answer within `Duration`, for timeout tests.
    Hang(Duration),
}

#[derive(Debug)]
struct MockState {
    behaviour: MockBehaviour,
    next_id: u64,
    runs: HashMap<String, EngineSnapshot>,
    submissions: Vec<SubmitRequest>,
    cancels: Vec<String>,
    calls: usize,
}

/// In-process engine that never runs anything.
#[derive(Debug)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::with_behaviour(MockBehaviour::Accept)
    }
}

impl MockEngine {
    /// An engine that accepts everything and leaves runs pending.
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Unavailable(message.into()))
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            state: Mutex::new(MockState {
                behaviour,
                next_id: 1,
                runs: HashMap::new(),
                submissions: Vec::new(),
                cancels: Vec::new(),
                calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.state().behaviour = behaviour;
    }

    /// Script the snapshot reported for `engine_id`.
    pub fn set(&self, engine_id: &str, snapshot: EngineSnapshot) {
        self.state().runs.insert(engine_id.to_owned(), snapshot);
    }

    /// Move a run to `status`, keeping its log.
    pub fn set_status(&self, engine_id: &str, status: EngineStatus) {
        self.update(engine_id, |run| run.status = status);
    }

    pub fn complete(&self, engine_id: &str, output: Value) {
        self.update(engine_id, |run| {
            run.status = EngineStatus::Completed;
            run.current_node = None;
            run.output_data = Some(output);
            run.end_time = Some(Utc::now());
        });
    }

    pub fn fail(&self, engine_id: &str, error: impl Into<String>) {
        let error = error.into();
        self.update(engine_id, |run| {
            run.status = EngineStatus::Failed;
            run.error = Some(error);
            run.end_time = Some(Utc::now());
        });
    }

    /// Append a log entry for `node_id`, stamped now.
    pub fn push_log(&self, engine_id: &str, node_id: &str, status: &str) {
        self.update(engine_id, |run| {
            run.current_node = Some(node_id.to_owned());
            run.execution_log.push(EngineLogEntry {
                node_id: node_id.to_owned(),
                node_name: node_id.to_owned(),
                status: status.to_owned(),
                result: None,
                error: None,
                timestamp: Some(Utc::now()),
            });
        });
    }

    /// All submissions received, in call order.
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state().submissions.clone()
    }

    /// Engine ids for which a cancel was requested, in call order.
    pub fn cancels(&self) -> Vec<String> {
        self.state().cancels.clone()
    }

    /// Number of calls of any kind this engine has received.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    fn update(&self, engine_id: &str, apply: impl FnOnce(&mut EngineSnapshot)) {
        let mut state = self.state();
        let run = state
            .runs
            .entry(engine_id.to_owned())
            .or_insert_with(|| EngineSnapshot::new(EngineStatus::Pending));
        apply(run);
    }

    /// Count the call and act out the configured behaviour.
    async fn enter(&self) -> Result<(), UpstreamError> {
        let behaviour = {
            let mut state = self.state();
            state.calls += 1;
            state.behaviour.clone()
        };
        match behaviour {
            MockBehaviour::Accept => Ok(()),
            MockBehaviour::Unavailable(message) => Err(UpstreamError::Transport(message)),
            MockBehaviour::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, UpstreamError> {
        self.enter().await?;
        let mut state = self.state();
        let engine_id = format!("engine-{}", state.next_id);
        state.next_id += 1;
        state.submissions.push(request.clone());
        state
            .runs
            .insert(engine_id.clone(), EngineSnapshot::new(EngineStatus::Pending));
        Ok(engine_id)
    }

    async fn status(&self, engine_execution_id: &str) -> Result<EngineSnapshot, UpstreamError> {
        self.enter().await?;
        self.state()
            .runs
            .get(engine_execution_id)
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                status: 404,
                message: format!("unknown execution {engine_execution_id}"),
            })
    }

    async fn cancel(&self, engine_execution_id: &str) -> Result<(), UpstreamError> {
        self.enter().await?;
        let mut state = self.state();
        if !state.runs.contains_key(engine_execution_id) {
            return Err(UpstreamError::Status {
                status: 404,
                message: format!("unknown execution {engine_execution_id}"),
            });
        }
        state.cancels.push(engine_execution_id.to_owned());
        Ok(())
    }
}
