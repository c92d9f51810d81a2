//! Task routes: CRUD, subtree/ancestry/context reads, status, reorder.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiJson, ApiQuery};
use crate::adapters::http::request_id::RequestId;
use crate::adapters::http::AppState;
use crate::domain::derived::EnrichedTask;
use crate::domain::models::{TaskStatus, TaskType};
use crate::services::{CreateTaskInput, TaskContext, TaskTreeNode, UpdateTaskInput};

#[derive(Debug, Deserialize)]
pub struct TaskCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub task_type: TaskType,
    #[serde(default)]
    pub position: Option<i64>,
}

impl From<TaskCreateRequest> for CreateTaskInput {
    fn from(request: TaskCreateRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            context: request.context,
            task_type: request.task_type,
            position: request.position,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub position: i64,
}

#[derive(Debug, Deserialize)]
pub struct ContextParams {
    #[serde(default)]
    pub include_commits: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/{id}/tasks", post(create_task))
        .route("/tasks/{id}/subtasks", post(create_subtask))
        .route("/tasks/{id}", get(get_task).put(update_task).delete(delete_task))
        .route("/tasks/{id}/tree", get(get_task_tree))
        .route("/tasks/{id}/ancestry", get(get_task_ancestry))
        .route("/tasks/{id}/context", get(get_task_context))
        .route("/tasks/{id}/status", patch(update_task_status))
        .route("/tasks/{id}/reorder", patch(reorder_task))
}

async fn create_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(project_id): Path<Uuid>,
    ApiJson(request): ApiJson<TaskCreateRequest>,
) -> Result<(StatusCode, Json<EnrichedTask>), ApiError> {
    let task = state
        .tasks
        .create_task(project_id, request.into(), None)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn create_subtask(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(parent_id): Path<Uuid>,
    ApiJson(request): ApiJson<TaskCreateRequest>,
) -> Result<(StatusCode, Json<EnrichedTask>), ApiError> {
    let parent = state
        .tasks
        .get_enriched(parent_id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    let task = state
        .tasks
        .create_task(parent.project_id, request.into(), Some(parent_id))
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrichedTask>, ApiError> {
    let task = state
        .tasks
        .get_enriched(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<TaskUpdateRequest>,
) -> Result<Json<EnrichedTask>, ApiError> {
    let input = UpdateTaskInput {
        name: request.name,
        description: request.description,
        context: request.context,
        task_type: request.task_type,
    };
    let task = state
        .tasks
        .update_task(id, input)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .tasks
        .delete_task(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_task_tree(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskTreeNode>, ApiError> {
    let tree = state
        .tasks
        .tree(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(tree))
}

async fn get_task_ancestry(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EnrichedTask>>, ApiError> {
    let ancestry = state
        .tasks
        .ancestry(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(ancestry))
}

async fn get_task_context(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
    ApiQuery(params): ApiQuery<ContextParams>,
) -> Result<Json<TaskContext>, ApiError> {
    let context = state
        .tasks
        .context(id, params.include_commits)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(context))
}

async fn update_task_status(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<StatusUpdateRequest>,
) -> Result<Json<EnrichedTask>, ApiError> {
    let task = state
        .tasks
        .update_status(id, request.status)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(task))
}

async fn reorder_task(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<ReorderRequest>,
) -> Result<Json<EnrichedTask>, ApiError> {
    let task = state
        .tasks
        .reorder(id, request.position)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(task))
}
