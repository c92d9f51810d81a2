//! Lock routes: acquire, heartbeat, release.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{patch, post};
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiJson, ApiQuery};
use crate::adapters::http::request_id::RequestId;
use crate::adapters::http::AppState;
use crate::domain::models::{LockPurpose, TaskLock};

#[derive(Debug, Deserialize)]
pub struct LockAcquireRequest {
    pub caller_label: String,
    pub lock_purpose: LockPurpose,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatParams {
    pub caller_label: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseParams {
    pub caller_label: String,
    #[serde(default)]
    pub force: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{id}/lock", post(acquire_lock).delete(release_lock))
        .route("/tasks/{id}/lock/heartbeat", patch(heartbeat_lock))
}

async fn acquire_lock(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiJson(request): ApiJson<LockAcquireRequest>,
) -> Result<(StatusCode, Json<TaskLock>), ApiError> {
    let lock = state
        .locks
        .acquire(task_id, &request.caller_label, request.lock_purpose)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(lock)))
}

async fn heartbeat_lock(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiQuery(params): ApiQuery<HeartbeatParams>,
) -> Result<Json<TaskLock>, ApiError> {
    let lock = state
        .locks
        .heartbeat(task_id, &params.caller_label)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(lock))
}

async fn release_lock(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(task_id): Path<Uuid>,
    ApiQuery(params): ApiQuery<ReleaseParams>,
) -> Result<StatusCode, ApiError> {
    state
        .locks
        .release(task_id, &params.caller_label, params.force)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(StatusCode::NO_CONTENT)
}
