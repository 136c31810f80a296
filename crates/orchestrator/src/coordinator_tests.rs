//! Tests for the execution coordinator.
//!
//! These run against `MemoryStore` and `MockEngine`, so no Postgres or
//! engine process is required.  Timing-sensitive tests pause tokio's clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use db::{MemoryStore, models::ExecutionStatus};
use nodes::{ConfigValue, NodeConfig, NodeTypeRegistry};

use crate::{
    EngineError,
    coordinator::{CoordinatorConfig, ExecuteRequest, ExecutionCoordinator},
    models::{NewWorkflow, WorkflowEdge, WorkflowNode},
    repository::WorkflowRepository,
    upstream::{EngineStatus, MockBehaviour, MockEngine, UpstreamError},
};

struct Harness {
    repo: WorkflowRepository,
    store: Arc<MemoryStore>,
    engine: Arc<MockEngine>,
    coordinator: Arc<ExecutionCoordinator>,
}

fn harness() -> Harness {
    harness_with(MockEngine::accepting(), CoordinatorConfig::default())
}

fn harness_with(engine: MockEngine, config: CoordinatorConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine);
    let repo = WorkflowRepository::new(store.clone(), Arc::new(NodeTypeRegistry::builtin()));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        repo.clone(),
        store.clone(),
        engine.clone(),
        config,
    ));
    Harness {
        repo,
        store,
        engine,
        coordinator,
    }
}

/// input → writer → output, with only the writer's required prompt set.
async fn stored_workflow(repo: &WorkflowRepository) -> Uuid {
    let new = NewWorkflow::new(
        "pipeline",
        vec![
            WorkflowNode::new("input", "input", "Input"),
            WorkflowNode::new("writer", "text_generation", "Writer")
                .with_config(NodeConfig::new().with("prompt", "Write about {topic}")),
            WorkflowNode::new("output", "output", "Output"),
        ],
        vec![
            WorkflowEdge::new("input", "writer"),
            WorkflowEdge::new("writer", "output"),
        ],
    );
    repo.create(new).await.expect("valid workflow").id
}

// ============================================================
// execute
// ============================================================

#[tokio::test]
async fn execute_records_a_pending_execution() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;

    let id = h
        .coordinator
        .execute(workflow_id, json!({ "topic": "ownership" }))
        .await
        .unwrap();

    let execution = h.coordinator.status(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Pending);
    assert_eq!(execution.workflow_id, workflow_id);
    assert_eq!(execution.engine_execution_id, "engine-1");
    assert_eq!(execution.input_data, json!({ "topic": "ownership" }));
    assert!(execution.execution_log.is_empty());
}

#[tokio::test]
async fn engine_receives_schema_defaults() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    let submissions = h.engine.submissions();
    assert_eq!(submissions.len(), 1);
    let writer = &submissions[0].workflow.nodes[1];
    assert_eq!(writer.config.get("max_length"), Some(&ConfigValue::Integer(500)));
    assert_eq!(writer.config.get("model"), Some(&ConfigValue::Text("default".into())));

    // The stored definition is untouched.
    let stored = h.repo.get(workflow_id).await.unwrap();
    assert!(!stored.nodes[1].config.contains("max_length"));
}

#[tokio::test]
async fn unknown_workflow_is_not_found_and_never_submitted() {
    let h = harness();
    let err = h.coordinator.execute(Uuid::new_v4(), json!({})).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound { kind: "workflow", .. }));
    assert_eq!(h.engine.call_count(), 0);
    assert_eq!(h.store.execution_count().await, 0);
}

#[tokio::test]
async fn engine_failure_records_nothing() {
    let h = harness_with(
        MockEngine::unavailable("connection refused"),
        CoordinatorConfig::default(),
    );
    let workflow_id = stored_workflow(&h.repo).await;

    let err = h.coordinator.execute(workflow_id, json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UpstreamUnavailable(UpstreamError::Transport(ref m))
            if m == "connection refused"
    ));
    assert_eq!(h.store.execution_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn hung_engine_times_out() {
    let config = CoordinatorConfig {
        engine_timeout: Duration::from_secs(5),
        ..CoordinatorConfig::default()
    };
    let h = harness_with(
        MockEngine::with_behaviour(MockBehaviour::Hang(Duration::from_secs(60))),
        config,
    );
    let workflow_id = stored_workflow(&h.repo).await;

    let err = h.coordinator.execute(workflow_id, json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UpstreamUnavailable(UpstreamError::Timeout(d)) if d == Duration::from_secs(5)
    ));
    assert_eq!(h.store.execution_count().await, 0);
}

#[tokio::test]
async fn executions_survive_workflow_deletion() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.repo.delete(workflow_id).await.unwrap();
    h.engine.complete("engine-1", json!({ "text": "done" }));

    let execution = h.coordinator.status(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.workflow_id, workflow_id);
}

// ============================================================
// status
// ============================================================

#[tokio::test]
async fn status_follows_the_engine_to_completion() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.engine.push_log("engine-1", "input", "completed");
    h.engine.set_status("engine-1", EngineStatus::Running);
    let running = h.coordinator.status(id).await.unwrap();
    assert_eq!(running.status, ExecutionStatus::Running);
    assert_eq!(running.current_node.as_deref(), Some("input"));
    assert_eq!(running.execution_log.len(), 1);
    assert_eq!(running.end_time, None);

    h.engine.push_log("engine-1", "writer", "completed");
    h.engine.push_log("engine-1", "output", "completed");
    h.engine.complete("engine-1", json!({ "text": "An essay on ownership" }));
    let done = h.coordinator.status(id).await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.output_data, Some(json!({ "text": "An essay on ownership" })));
    assert!(done.end_time.is_some());

    let nodes: Vec<_> = done.execution_log.iter().map(|e| e.node_id.as_str()).collect();
    assert_eq!(nodes, vec!["input", "writer", "output"]);
    assert!(done
        .execution_log
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn terminal_executions_are_not_polled() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.engine.fail("engine-1", "model crashed");
    let failed = h.coordinator.status(id).await.unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("model crashed"));

    let calls = h.engine.call_count();
    h.engine.set_behaviour(MockBehaviour::Unavailable("gone".into()));
    h.engine.set_status("engine-1", EngineStatus::Running);

    let again = h.coordinator.status(id).await.unwrap();
    assert_eq!(again.status, ExecutionStatus::Failed);
    assert_eq!(h.engine.call_count(), calls);
}

#[tokio::test]
async fn repeated_polls_do_not_duplicate_the_log() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.engine.push_log("engine-1", "input", "completed");
    h.engine.set_status("engine-1", EngineStatus::Running);
    for _ in 0..3 {
        h.coordinator.status(id).await.unwrap();
    }
    assert_eq!(h.coordinator.status(id).await.unwrap().execution_log.len(), 1);
}

#[tokio::test]
async fn concurrent_polls_settle_once() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.engine.push_log("engine-1", "input", "completed");
    h.engine.complete("engine-1", json!({}));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.status(id).await })
        })
        .collect();
    for handle in handles {
        let execution = handle.await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.execution_log.len(), 1);
    }
}

#[tokio::test]
async fn unknown_execution_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.coordinator.status(Uuid::new_v4()).await,
        Err(EngineError::NotFound { kind: "execution", .. })
    ));
}

// ============================================================
// cancel
// ============================================================

#[tokio::test]
async fn cancel_is_recorded_then_confirmed_by_status() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    let requested = h.coordinator.cancel(id).await.unwrap();
    assert_eq!(requested.status, ExecutionStatus::Pending);
    assert!(requested.cancel_requested);
    assert_eq!(h.engine.cancels(), vec!["engine-1".to_string()]);

    h.engine.set_status("engine-1", EngineStatus::Cancelled);
    let confirmed = h.coordinator.status(id).await.unwrap();
    assert_eq!(confirmed.status, ExecutionStatus::Cancelled);
    assert!(confirmed.end_time.is_some());
}

#[tokio::test]
async fn cancelling_a_completed_execution_is_invalid() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.engine.complete("engine-1", json!({}));
    h.coordinator.status(id).await.unwrap();

    let err = h.coordinator.cancel(id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState { status: ExecutionStatus::Completed, action: "cancel", .. }
    ));
    assert!(h.engine.cancels().is_empty());
}

#[tokio::test]
async fn rejected_cancel_leaves_the_execution_untouched() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.engine.set_behaviour(MockBehaviour::Unavailable("down".into()));
    assert!(matches!(
        h.coordinator.cancel(id).await,
        Err(EngineError::UpstreamUnavailable(_))
    ));

    h.engine.set_behaviour(MockBehaviour::Accept);
    let execution = h.coordinator.status(id).await.unwrap();
    assert!(!execution.cancel_requested);
}

#[tokio::test]
async fn cancelling_an_unknown_execution_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.coordinator.cancel(Uuid::new_v4()).await,
        Err(EngineError::NotFound { .. })
    ));
}

// ============================================================
// result / wait_for_completion
// ============================================================

#[tokio::test]
async fn result_requires_completion() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.engine.set_status("engine-1", EngineStatus::Running);
    assert!(matches!(
        h.coordinator.result(id).await,
        Err(EngineError::InvalidState { status: ExecutionStatus::Running, .. })
    ));

    h.engine.complete("engine-1", json!({ "text": "final" }));
    let result = h.coordinator.result(id).await.unwrap();
    assert_eq!(result.output_data, Some(json!({ "text": "final" })));
    assert!(result.execution_time.is_some_and(|secs| secs >= 0.0));
}

#[tokio::test(start_paused = true)]
async fn wait_gives_up_at_the_deadline() {
    let config = CoordinatorConfig {
        poll_interval: Duration::from_secs(2),
        ..CoordinatorConfig::default()
    };
    let h = harness_with(MockEngine::accepting(), config);
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.engine.set_status("engine-1", EngineStatus::Running);

    let started = tokio::time::Instant::now();
    let execution = h
        .coordinator
        .wait_for_completion(id, Duration::from_secs(7))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(started.elapsed() <= Duration::from_secs(7));
    // Polled at t = 0, 2, 4 and 6.
    assert_eq!(h.engine.call_count(), 1 + 4);
}

#[tokio::test(start_paused = true)]
async fn wait_returns_once_terminal() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    let id = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.engine.complete("engine-1", json!({}));

    let execution = h
        .coordinator
        .wait_for_completion(id, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
}

// ============================================================
// execute_batch
// ============================================================

#[tokio::test(start_paused = true)]
async fn batch_is_paced_and_isolates_failures() {
    let config = CoordinatorConfig {
        batch_pacing: Duration::from_millis(500),
        ..CoordinatorConfig::default()
    };
    let h = harness_with(MockEngine::accepting(), config);
    let workflow_id = stored_workflow(&h.repo).await;
    let missing = Uuid::new_v4();

    let started = tokio::time::Instant::now();
    let outcomes = h
        .coordinator
        .execute_batch(vec![
            ExecuteRequest { workflow_id, input_data: json!({ "n": 1 }) },
            ExecuteRequest { workflow_id: missing, input_data: json!({}) },
            ExecuteRequest { workflow_id, input_data: json!({ "n": 3 }) },
        ])
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1500));
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].execution_id.is_some());
    assert_eq!(outcomes[1].workflow_id, missing);
    assert!(outcomes[1].execution_id.is_none());
    assert!(outcomes[1].error.as_deref().is_some_and(|e| e.contains("not found")));
    assert!(outcomes[2].execution_id.is_some());
    assert_eq!(h.engine.submissions().len(), 2);
}

// ============================================================
// stats
// ============================================================

#[tokio::test]
async fn stats_reflect_stored_outcomes() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;

    let done = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    let broken = h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.coordinator.execute(workflow_id, json!({})).await.unwrap();

    h.engine.complete("engine-1", json!({ "text": "ok" }));
    h.engine.fail("engine-2", "model crashed");
    h.coordinator.status(done).await.unwrap();
    h.coordinator.status(broken).await.unwrap();
    let polls = h.engine.call_count();

    let stats = h.coordinator.stats(workflow_id).await.unwrap();
    assert_eq!(stats.workflow_id, workflow_id);
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.failed_runs, 1);
    assert_eq!(stats.active_runs, 1);
    assert_eq!(stats.success_rate, 0.5);
    assert!(stats.last_execution.is_some());
    // Stats never poll the engine.
    assert_eq!(h.engine.call_count(), polls);
}

#[tokio::test]
async fn stats_survive_workflow_deletion() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;
    h.coordinator.execute(workflow_id, json!({})).await.unwrap();
    h.repo.delete(workflow_id).await.unwrap();

    let stats = h.coordinator.stats(workflow_id).await.unwrap();
    assert_eq!(stats.total_executions, 1);
    assert_eq!(stats.active_runs, 1);
}

#[tokio::test]
async fn stats_of_a_never_run_workflow_are_empty() {
    let h = harness();
    let workflow_id = stored_workflow(&h.repo).await;

    let stats = h.coordinator.stats(workflow_id).await.unwrap();
    assert_eq!(stats.total_executions, 0);
    assert_eq!(stats.success_rate, 0.0);

    let err = h.coordinator.stats(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "workflow", .. }));
}
