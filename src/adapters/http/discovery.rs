//! Discovery routes: backlog, in-progress, needs-refinement, available.

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiQuery, FieldError};
use crate::adapters::http::request_id::RequestId;
use crate::adapters::http::AppState;
use crate::domain::derived::EnrichedTask;
use crate::services::{AvailableFilters, Page, TaskWithLockInfo};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListParams {
    fn page(&self, request_id: RequestId) -> Result<Page, ApiError> {
        let limit = self.limit.unwrap_or(50);
        if !(1..=200).contains(&limit) {
            return Err(ApiError::validation(
                vec![FieldError::new("limit", "limit must be between 1 and 200")],
                request_id,
            ));
        }
        Ok(Page { limit, offset: self.offset.unwrap_or(0) })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailableParams {
    pub operation: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub min_points: Option<i32>,
    #[serde(default)]
    pub max_points: Option<i32>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/{id}/backlog", get(get_backlog))
        .route("/projects/{id}/in-progress", get(get_in_progress))
        .route("/projects/{id}/needs-refinement", get(get_needs_refinement))
        .route("/tasks/available", get(get_available))
}

async fn get_backlog(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(project_id): Path<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<EnrichedTask>>, ApiError> {
    let page = params.page(request_id)?;
    let backlog = state
        .discovery
        .backlog(project_id, page)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(backlog))
}

async fn get_in_progress(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(project_id): Path<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<TaskWithLockInfo>>, ApiError> {
    let page = params.page(request_id)?;
    let in_progress = state
        .discovery
        .in_progress(project_id, page)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(in_progress))
}

async fn get_needs_refinement(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(project_id): Path<Uuid>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<EnrichedTask>>, ApiError> {
    let page = params.page(request_id)?;
    let listed = state
        .discovery
        .needs_refinement(project_id, page)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(listed))
}

async fn get_available(
    State(state): State<AppState>,
    request_id: RequestId,
    ApiQuery(params): ApiQuery<AvailableParams>,
) -> Result<Json<Vec<EnrichedTask>>, ApiError> {
    let page = ListParams { limit: params.limit, offset: params.offset }.page(request_id)?;

    let mut errors = Vec::new();
    if params.min_points.is_some_and(|p| p < 0) {
        errors.push(FieldError::new("min_points", "must be >= 0"));
    }
    if params.max_points.is_some_and(|p| p < 0) {
        errors.push(FieldError::new("max_points", "must be >= 0"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors, request_id));
    }

    let filters = AvailableFilters {
        project_id: params.project_id,
        task_type: params.task_type,
        min_points: params.min_points,
        max_points: params.max_points,
    };
    let available = state
        .discovery
        .available(&params.operation, filters, page)
        .await
        .map_err(|e| ApiError::from_domain(e, request_id))?;
    Ok(Json(available))
}
