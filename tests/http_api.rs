//! End-to-end scenarios over the HTTP router with a fresh in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use chorus::adapters::http::{build_router, AppState};
use chorus::adapters::sqlite::{
    create_migrated_test_pool, SqliteCommitRepository, SqliteIdempotencyRepository,
    SqliteLockRepository, SqliteProjectRepository, SqliteTaskRepository, SqliteWorkLogRepository,
};
use chorus::services::{
    AtomicService, DiscoveryService, LockService, ProjectService, TaskService,
};

async fn test_app() -> (Router, SqlitePool) {
    let pool = create_migrated_test_pool().await.unwrap();

    let projects = Arc::new(SqliteProjectRepository::new(pool.clone()));
    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
    let work_log = Arc::new(SqliteWorkLogRepository::new(pool.clone()));
    let commits = Arc::new(SqliteCommitRepository::new(pool.clone()));
    let idempotency = Arc::new(SqliteIdempotencyRepository::new(pool.clone()));

    let task_service = TaskService::new(
        tasks.clone(),
        locks.clone(),
        projects.clone(),
        work_log.clone(),
        commits.clone(),
    );
    let state = AppState {
        projects: ProjectService::new(
            projects.clone(),
            tasks.clone(),
            locks.clone(),
            work_log.clone(),
            commits.clone(),
        ),
        locks: LockService::new(task_service.clone(), locks.clone()),
        atomic: AtomicService::new(task_service.clone(), tasks.clone(), work_log, commits, idempotency),
        discovery: DiscoveryService::new(tasks, locks, projects),
        tasks: task_service,
    };

    (build_router(state), pool)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    extra_headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    assert!(
        response.headers().contains_key("x-request-id"),
        "every response carries X-Request-ID"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_project(app: &Router) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        "/projects",
        Some(json!({"name": "Test project"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_task(app: &Router, project_id: Uuid, name: &str) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/projects/{project_id}/tasks"),
        Some(json!({"name": name, "task_type": "feature"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_subtask(app: &Router, parent_id: Uuid, name: &str) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/tasks/{parent_id}/subtasks"),
        Some(json!({"name": name, "task_type": "feature"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn set_status(app: &Router, task_id: Uuid, status_str: &str) {
    let (status, _) = send(
        app,
        Method::PATCH,
        &format!("/tasks/{task_id}/status"),
        Some(json!({"status": status_str})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn sizing_body() -> Value {
    json!({
        "scope_clarity": {"score": 1, "reasoning": "clear"},
        "decision_points": {"score": 2, "reasoning": "several"},
        "context_window_demand": {"score": 0, "reasoning": "small"},
        "verification_complexity": {"score": 1, "reasoning": "tests exist"},
        "domain_specificity": {"score": 1, "reasoning": "common"},
        "confidence": 4,
        "work_log_content": "scored"
    })
}

async fn expire_lock(pool: &SqlitePool, task_id: Uuid) {
    sqlx::query("UPDATE task_locks SET expires_at = ? WHERE task_id = ?")
        .bind((Utc::now() - Duration::seconds(1)).to_rfc3339())
        .bind(task_id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn health_endpoint() {
    let (app, _pool) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_task_yields_error_envelope() {
    let (app, _pool) = test_app().await;
    let id = Uuid::new_v4();
    let (status, body) = send(&app, Method::GET, &format!("/tasks/{id}"), None, &[]).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["request_id"].is_string());
}

#[tokio::test]
async fn size_makes_task_ready() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "size me").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/size"),
        Some(sizing_body()),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 5);
    assert_eq!(body["effective_points"], 5);
    assert_eq!(body["readiness"], "ready");

    let (status, log) = send(&app, Method::GET, &format!("/tasks/{task_id}/work-log"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["operation"], "sizing");
}

#[tokio::test]
async fn sizing_rejects_out_of_range_scores() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;

    let mut body = sizing_body();
    body["decision_points"]["score"] = json!(3);
    let (status, response) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/size"),
        Some(body),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    assert!(response["error"]["details"]["errors"].is_array());
}

#[tokio::test]
async fn breakdown_auto_positions_children() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "parent").await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/breakdown"),
        Some(json!({
            "subtasks": [
                {"name": "first", "task_type": "feature"},
                {"name": "second", "task_type": "bug"}
            ],
            "work_log_content": "split"
        })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, tree) = send(&app, Method::GET, &format!("/tasks/{task_id}/tree"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let positions: Vec<i64> = tree["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["position"].as_i64().unwrap())
        .collect();
    assert_eq!(positions, [0, 1]);
}

#[tokio::test]
async fn lock_conflict_and_takeover_after_expiry() {
    let (app, pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "contested").await;

    let (status, lock) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-1", "lock_purpose": "sizing"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lock["caller_label"], "agent-1");

    let (status, conflict) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-2", "lock_purpose": "sizing"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["code"], "LOCK_CONFLICT");

    expire_lock(&pool, task_id).await;

    let (status, lock) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-2", "lock_purpose": "sizing"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lock["caller_label"], "agent-2");
}

#[tokio::test]
async fn heartbeat_and_release_check_ownership() {
    let (app, pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "leased").await;

    send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-1", "lock_purpose": "refinement"})),
        &[],
    )
    .await;

    let (status, lock) = send(
        &app,
        Method::PATCH,
        &format!("/tasks/{task_id}/lock/heartbeat?caller_label=agent-1"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(lock["last_heartbeat_at"].is_string());

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/tasks/{task_id}/lock/heartbeat?caller_label=agent-2"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    expire_lock(&pool, task_id).await;
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/tasks/{task_id}/lock/heartbeat?caller_label=agent-1"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "LOCK_CONFLICT");

    // Mismatched release fails unless forced
    send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-1", "lock_purpose": "refinement"})),
        &[],
    )
    .await;
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/tasks/{task_id}/lock?caller_label=agent-2"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/tasks/{task_id}/lock?caller_label=agent-2&force=true"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn completion_gate_blocks_open_child() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let parent_id = create_task(&app, project_id, "parent").await;
    create_subtask(&app, parent_id, "child").await;

    set_status(&app, parent_id, "doing").await;
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/tasks/{parent_id}/complete"),
        Some(json!({"work_log_content": "done"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn invalid_transition_carries_from_to_details() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/tasks/{task_id}/status"),
        Some(json!({"status": "done"})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_STATUS_TRANSITION");
    assert_eq!(body["error"]["details"]["from"], "todo");
    assert_eq!(body["error"]["details"]["to"], "done");
}

#[tokio::test]
async fn reopening_child_reopens_parent() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let parent_id = create_task(&app, project_id, "parent").await;
    let child_id = create_subtask(&app, parent_id, "child").await;

    set_status(&app, child_id, "doing").await;
    set_status(&app, child_id, "done").await;
    set_status(&app, parent_id, "doing").await;
    set_status(&app, parent_id, "done").await;

    set_status(&app, child_id, "todo").await;

    let (status, parent) = send(&app, Method::GET, &format!("/tasks/{parent_id}"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parent["status"], "todo");
}

#[tokio::test]
async fn idempotent_size_replays_without_double_mutation() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;

    let headers = [("Idempotency-Key", "k-1")];
    let (status, first) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/size"),
        Some(sizing_body()),
        &headers,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/size"),
        Some(sizing_body()),
        &headers,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);

    let (_, log) = send(&app, Method::GET, &format!("/tasks/{task_id}/work-log"), None, &[]).await;
    assert_eq!(log.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn complete_records_commits() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;
    set_status(&app, task_id, "doing").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/complete"),
        Some(json!({
            "work_log_content": "implemented",
            "commits": [{
                "commit_hash": "0123456789abcdef0123456789abcdef01234567",
                "message": "the fix",
                "committed_at": Utc::now().to_rfc3339()
            }]
        })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");

    let (status, commits) = send(&app, Method::GET, &format!("/tasks/{task_id}/commits"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(commits.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn complete_rejects_malformed_commit_hash() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;
    set_status(&app, task_id, "doing").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/complete"),
        Some(json!({
            "work_log_content": "implemented",
            "commits": [{"commit_hash": "nothex", "committed_at": Utc::now().to_rfc3339()}]
        })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn backlog_lists_only_ready_todo_tasks() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let ready_id = create_task(&app, project_id, "ready").await;
    create_task(&app, project_id, "unsized").await;

    send(
        &app,
        Method::POST,
        &format!("/tasks/{ready_id}/size"),
        Some(sizing_body()),
        &[],
    )
    .await;

    let (status, backlog) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/backlog"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = backlog
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["ready"]);
}

#[tokio::test]
async fn available_excludes_locked_tasks() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let locked_id = create_task(&app, project_id, "locked").await;
    create_task(&app, project_id, "free").await;

    send(
        &app,
        Method::POST,
        &format!("/tasks/{locked_id}/lock"),
        Some(json!({"caller_label": "agent-1", "lock_purpose": "sizing"})),
        &[],
    )
    .await;

    let (status, available) = send(
        &app,
        Method::GET,
        &format!("/tasks/available?operation=sizing&project_id={project_id}"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = available
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["free"]);
}

#[tokio::test]
async fn available_unknown_operation_is_empty() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    create_task(&app, project_id, "t").await;

    let (status, available) = send(
        &app,
        Method::GET,
        "/tasks/available?operation=review",
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(available.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn in_progress_decorates_lock_info() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "busy").await;

    send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/size"),
        Some(sizing_body()),
        &[],
    )
    .await;
    set_status(&app, task_id, "doing").await;
    send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/lock"),
        Some(json!({"caller_label": "agent-1", "lock_purpose": "refinement"})),
        &[],
    )
    .await;

    let (status, listed) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/in-progress"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = listed.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["lock_caller_label"], "agent-1");
    assert_eq!(entries[0]["lock_purpose"], "refinement");
}

#[tokio::test]
async fn export_inlines_work_log_and_commits() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;
    let task_id = create_task(&app, project_id, "t").await;

    send(
        &app,
        Method::POST,
        &format!("/tasks/{task_id}/work-log"),
        Some(json!({"operation": "note", "content": "remember this"})),
        &[],
    )
    .await;

    let (status, export) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/export"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(export["exported_at"].is_string());
    let tasks = export["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["work_log_entries"].as_array().unwrap().len(), 1);
    assert!(tasks[0].get("readiness").is_none(), "export carries no derived fields");
}

#[tokio::test]
async fn limit_out_of_range_is_rejected() {
    let (app, _pool) = test_app().await;
    let project_id = create_project(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/backlog?limit=500"),
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
