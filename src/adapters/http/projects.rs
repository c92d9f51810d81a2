//! Project routes: CRUD, detail aggregates, export, root task listing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiJson, FieldError};
use crate::adapters::http::request_id::RequestId;
use crate::adapters::http::AppState;
use crate::domain::derived::EnrichedTask;
use crate::domain::models::Project;
use crate::services::{ProjectDetail, ProjectExport};

#[derive(Debug, Deserialize)]
pub struct ProjectCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/export", get(export_project))
        .route("/projects/{id}/tasks", get(get_project_tasks))
}

async fn create_project(
    State(state): State<AppState>,
    request_id: RequestId,
    ApiJson(request): ApiJson<ProjectCreateRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation(
            vec![FieldError::new("name", "must not be empty")],
            request_id,
        ));
    }
    let project = state
        .projects
        .create(request.name, request.description)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(
    State(state): State<AppState>,
    request_id: RequestId,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state
        .projects
        .list()
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(projects))
}

async fn get_project(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let detail = state
        .projects
        .detail(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(detail))
}

async fn update_project(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<ProjectUpdateRequest>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .projects
        .update(id, request.name, request.description)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .projects
        .delete(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_project(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectExport>, ApiError> {
    let export = state
        .projects
        .export(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(export))
}

async fn get_project_tasks(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EnrichedTask>>, ApiError> {
    let tasks = state
        .projects
        .root_tasks(id)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(tasks))
}
