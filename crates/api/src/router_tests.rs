//! End-to-end tests for the router, driven through `tower::ServiceExt`
//! against `MemoryStore` and `MockEngine`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use db::MemoryStore;
use nodes::NodeTypeRegistry;
use orchestrator::{CoordinatorConfig, ExecutionCoordinator, MockEngine, WorkflowRepository};

use crate::{router, AppState};

struct TestApp {
    router: Router,
    engine: Arc<MockEngine>,
}

fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(MockEngine::accepting());
    let repository = WorkflowRepository::new(store.clone(), Arc::new(NodeTypeRegistry::builtin()));
    let config = CoordinatorConfig {
        batch_pacing: Duration::ZERO,
        ..CoordinatorConfig::default()
    };
    let coordinator = Arc::new(ExecutionCoordinator::new(
        repository.clone(),
        store,
        engine.clone(),
        config,
    ));
    TestApp {
        router: router(AppState::new(repository, coordinator)),
        engine,
    }
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn pipeline(name: &str) -> Value {
    json!({
        "name": name,
        "description": "three steps",
        "nodes": [
            { "id": "in", "type": "input", "name": "Input" },
            { "id": "gen", "type": "text_generation", "name": "Writer",
              "config": { "prompt": "Write about {topic}" } },
            { "id": "out", "type": "output", "name": "Output" }
        ],
        "edges": [
            { "from": "in", "to": "gen" },
            { "from": "gen", "to": "out" }
        ]
    })
}

async fn create(app: &TestApp, name: &str) -> String {
    let (status, body) =
        call(app, Method::POST, "/api/v1/workflow/create", Some(pipeline(name))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_owned()
}

// ===========================================================================
// Catalogue routes
// ===========================================================================

#[tokio::test]
async fn health_is_outside_the_prefix() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn node_types_are_listed_with_a_total() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/workflow/node-types", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let items = body["data"].as_array().unwrap();
    assert_eq!(body["total"], items.len());
    assert!(items.iter().any(|t| t["type"] == "text_generation"));
}

#[tokio::test]
async fn template_instantiation_creates_a_workflow() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/workflow/templates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/templates/blog_post_workflow/instantiate",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["data"]["id"].as_str().unwrap().to_owned();

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/workflow/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_template_is_404() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/templates/no_such_template/instantiate",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("no_such_template"));
}

// ===========================================================================
// Workflow CRUD
// ===========================================================================

#[tokio::test]
async fn create_get_preview_delete() {
    let app = app();
    let id = create(&app, "blog").await;

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/workflow/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "blog");
    assert_eq!(body["data"]["nodes"].as_array().unwrap().len(), 3);

    let uri = format!("/api/v1/workflow/{id}/preview");
    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["node_count"], 3);
    assert_eq!(body["data"]["edge_count"], 2);

    let (status, body) = call(&app, Method::DELETE, &format!("/api/v1/workflow/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], true);

    let (status, _) = call(&app, Method::GET, &format!("/api/v1/workflow/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cyclic_workflow_is_rejected_with_400() {
    let app = app();
    let mut body = pipeline("loop");
    body["edges"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "from": "out", "to": "in" }));

    let (status, body) = call(&app, Method::POST, "/api/v1/workflow/create", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("cycle"));
}

#[tokio::test]
async fn malformed_body_is_an_enveloped_400() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/create",
        Some(json!({ "nodes": "not a list" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_id_is_400_not_404() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/workflow/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));
}

#[tokio::test]
async fn list_is_paginated() {
    let app = app();
    for i in 0..3 {
        create(&app, &format!("wf-{i}")).await;
    }

    let (status, body) =
        call(&app, Method::GET, "/api/v1/workflow/list?page=2&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["has_next"], false);
    assert_eq!(body["has_prev"], true);
    // Summaries carry a node count instead of the full graph.
    assert_eq!(body["data"][0]["node_count"], 3);
    assert!(body["data"][0].get("nodes").is_none());
}

#[tokio::test]
async fn garbage_paging_parameters_fall_back_to_defaults() {
    let app = app();
    create(&app, "only").await;

    let uri = "/api/v1/workflow/list?page=abc&limit=-4";
    let (status, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn oversized_limit_is_capped_at_one_hundred() {
    let app = app();
    create(&app, "only").await;

    let uri = "/api/v1/workflow/list?limit=500";
    let (status, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// ===========================================================================
// Executions
// ===========================================================================

#[tokio::test]
async fn execute_status_result_roundtrip() {
    let app = app();
    let id = create(&app, "run").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute",
        Some(json!({ "workflow_id": id, "input_data": { "topic": "rust" } })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["workflow_id"], id.as_str());
    let execution_id = body["data"]["execution_id"].as_str().unwrap().to_owned();

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/result"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    app.engine.complete("engine-1", json!({ "text": "done" }));

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/result"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["output_data"]["text"], "done");
}

#[tokio::test]
async fn execute_of_missing_workflow_is_404() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute",
        Some(json!({ "workflow_id": uuid::Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(app.engine.submissions().is_empty());
}

#[tokio::test]
async fn engine_outage_is_502() {
    let app = app();
    let id = create(&app, "run").await;
    app.engine
        .set_behaviour(orchestrator::upstream::MockBehaviour::Unavailable("engine down".into()));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute",
        Some(json!({ "workflow_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("engine down"));
}

#[tokio::test]
async fn cancel_is_accepted_then_rejected_once_terminal() {
    let app = app();
    let id = create(&app, "run").await;
    let (_, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute",
        Some(json!({ "workflow_id": id })),
    )
    .await;
    let execution_id = body["data"]["execution_id"].as_str().unwrap().to_owned();
    let cancel_uri = format!("/api/v1/workflow/execution/{execution_id}/cancel");

    let (status, body) = call(&app, Method::POST, &cancel_uri, None).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["data"]["cancel_requested"], true);
    assert_eq!(app.engine.cancels(), vec!["engine-1".to_string()]);

    app.engine.fail("engine-1", "boom");
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::POST, &cancel_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn batch_reports_each_request() {
    let app = app();
    let id = create(&app, "run").await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute/batch",
        Some(json!({ "requests": [
            { "workflow_id": id },
            { "workflow_id": missing }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");
    assert_eq!(body["total"], 2);
    assert!(body["data"][0]["execution_id"].is_string());
    assert!(body["data"][1]["error"].is_string());
}

#[tokio::test]
async fn empty_batch_is_400() {
    let app = app();
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute/batch",
        Some(json!({ "requests": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn result_can_wait_for_a_finished_run() {
    let app = app();
    let id = create(&app, "run").await;
    let (_, body) = call(
        &app,
        Method::POST,
        "/api/v1/workflow/execute",
        Some(json!({ "workflow_id": id })),
    )
    .await;
    let execution_id = body["data"]["execution_id"].as_str().unwrap().to_owned();
    app.engine.complete("engine-1", json!({ "text": "done" }));

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/result?wait_secs=5"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/execution/{execution_id}/result?wait_secs=soon"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn stats_count_runs_of_a_workflow() {
    let app = app();
    let id = create(&app, "run").await;
    for _ in 0..2 {
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/workflow/execute",
            Some(json!({ "workflow_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let uri = format!("/api/v1/workflow/{id}/stats");
    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["workflow_id"], id.as_str());
    assert_eq!(body["data"]["total_executions"], 2);
    assert_eq!(body["data"]["active_runs"], 2);
    assert_eq!(body["data"]["success_rate"], 0.0);

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/v1/workflow/{}/stats", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
