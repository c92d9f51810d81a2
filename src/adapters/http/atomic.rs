//! Atomic operation routes: size, breakdown, refine, flag-refinement,
//! complete, plus the work-log and commit sub-resources.
//!
//! Size, breakdown, refine, and complete honor the `Idempotency-Key`
//! header: the handler scopes the client key by operation, replays an
//! unexpired captured response, and otherwise executes then captures.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiJson, FieldError};
use crate::adapters::http::request_id::RequestId;
use crate::adapters::http::AppState;
use crate::domain::derived::EnrichedTask;
use crate::domain::errors::DomainResult;
use crate::domain::models::{IdempotencyRecord, Operation, TaskCommit, WorkLogEntry};
use crate::services::{
    BreakdownInput, CommitInput, CompleteInput, FlagRefinementInput, RefineInput, SizingInput,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
pub struct WorkLogCreateRequest {
    #[serde(default)]
    pub author: Option<String>,
    pub operation: Operation,
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{id}/size", post(size_task))
        .route("/tasks/{id}/breakdown", post(breakdown_task))
        .route("/tasks/{id}/refine", post(refine_task))
        .route("/tasks/{id}/flag-refinement", post(flag_refinement))
        .route("/tasks/{id}/complete", post(complete_task))
        .route("/tasks/{id}/work-log", get(get_work_log).post(create_work_log))
        .route("/tasks/{id}/commits", get(get_commits).post(create_commit))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Replay a captured response for the scoped key, or execute, capture, and
/// respond. A concurrent duplicate resolves to the stored winner's body.
async fn run_idempotent<F>(
    state: &AppState,
    request_id: RequestId,
    operation: &'static str,
    client_key: Option<String>,
    execute: F,
) -> Result<Response, ApiError>
where
    F: std::future::Future<Output = DomainResult<EnrichedTask>>,
{
    let scoped_key = client_key.map(|key| IdempotencyRecord::scoped_key(operation, &key));

    if let Some(scoped_key) = &scoped_key {
        let cached = state
            .atomic
            .check_idempotency(scoped_key)
            .await
            .map_err(|e| ApiError::from_domain(e, request_id))?;
        if let Some(record) = cached {
            let status = StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::OK);
            return Ok((status, Json(record.response_body)).into_response());
        }
    }

    let task = execute.await.map_err(|e| ApiError::from_domain(e, request_id))?;
    let body = serde_json::to_value(&task).map_err(|e| ApiError::from_domain(e.into(), request_id))?;

    if let Some(scoped_key) = &scoped_key {
        let record = state
            .atomic
            .store_idempotency(scoped_key, 200, body)
            .await
            .map_err(|e| ApiError::from_domain(e, request_id))?;
        return Ok((StatusCode::OK, Json(record.response_body)).into_response());
    }

    Ok((StatusCode::OK, Json(body)).into_response())
}

fn validate_dimension(errors: &mut Vec<FieldError>, field: &str, score: i32) {
    if !(0..=2).contains(&score) {
        errors.push(FieldError::new(field, "score must be 0-2"));
    }
}

fn validate_sizing(input: &SizingInput) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for (name, dimension) in input.dimensions() {
        validate_dimension(&mut errors, name, dimension.score);
    }
    if !(0..=5).contains(&input.confidence) {
        errors.push(FieldError::new("confidence", "confidence must be 0-5"));
    }
    errors
}

fn validate_commit_hash(errors: &mut Vec<FieldError>, field: &str, hash: &str) {
    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.push(FieldError::new(field, "commit_hash must be a 40-character hex string"));
    }
}

async fn size_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<SizingInput>,
) -> Result<Response, ApiError> {
    let errors = validate_sizing(&input);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors, request_id));
    }

    let key = idempotency_key(&headers);
    run_idempotent(&state, request_id, "size", key, state.atomic.size(task_id, input)).await
}

async fn breakdown_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<BreakdownInput>,
) -> Result<Response, ApiError> {
    if input.subtasks.is_empty() {
        return Err(ApiError::validation(
            vec![FieldError::new("subtasks", "at least one subtask is required")],
            request_id,
        ));
    }

    let key = idempotency_key(&headers);
    run_idempotent(&state, request_id, "breakdown", key, state.atomic.breakdown(task_id, input)).await
}

async fn refine_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<RefineInput>,
) -> Result<Response, ApiError> {
    let key = idempotency_key(&headers);
    run_idempotent(&state, request_id, "refine", key, state.atomic.refine(task_id, input)).await
}

async fn flag_refinement(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiJson(input): ApiJson<FlagRefinementInput>,
) -> Result<Json<EnrichedTask>, ApiError> {
    let task = state
        .atomic
        .flag_refinement(task_id, input)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CompleteInput>,
) -> Result<Response, ApiError> {
    let mut errors = Vec::new();
    for (i, commit) in input.commits.iter().flatten().enumerate() {
        validate_commit_hash(&mut errors, &format!("commits[{i}].commit_hash"), &commit.commit_hash);
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors, request_id));
    }

    let key = idempotency_key(&headers);
    run_idempotent(&state, request_id, "complete", key, state.atomic.complete(task_id, input)).await
}

async fn create_work_log(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiJson(request): ApiJson<WorkLogCreateRequest>,
) -> Result<(StatusCode, Json<WorkLogEntry>), ApiError> {
    let entry = state
        .atomic
        .create_work_log_entry(task_id, request.operation, request.content, request.author)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_work_log(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<WorkLogEntry>>, ApiError> {
    let entries = state
        .atomic
        .get_work_log(task_id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(entries))
}

async fn create_commit(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiJson(input): ApiJson<CommitInput>,
) -> Result<(StatusCode, Json<TaskCommit>), ApiError> {
    let mut errors = Vec::new();
    validate_commit_hash(&mut errors, "commit_hash", &input.commit_hash);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors, request_id));
    }

    let commit = state
        .atomic
        .create_commit(task_id, input)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(commit)))
}

async fn get_commits(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<TaskCommit>>, ApiError> {
    let commits = state
        .atomic
        .get_commits(task_id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(commits))
}
