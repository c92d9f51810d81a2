//! HTTP transport: axum routers over the service layer.

pub mod atomic;
pub mod discovery;
pub mod error;
pub mod locks;
pub mod projects;
pub mod request_id;
pub mod tasks;

use axum::http::header::HeaderValue;
use axum::response::Json;
use axum::routing::get;
use axum::{middleware, Router};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::{AtomicService, DiscoveryService, LockService, ProjectService, TaskService};

/// Origin allowed to call the API with credentials.
pub const CORS_ORIGIN: &str = "http://localhost:3000";

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub projects: ProjectService,
    pub tasks: TaskService,
    pub locks: LockService,
    pub atomic: AtomicService,
    pub discovery: DiscoveryService,
}

/// Build the full application router: resource routes, request-id
/// middleware, CORS for the local frontend, and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static(CORS_ORIGIN))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .merge(projects::router())
        .merge(tasks::router())
        .merge(locks::router())
        .merge(atomic::router())
        .merge(discovery::router())
        .route("/health", get(health_check))
        .with_state(state)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
