//! The transport error envelope.
//!
//! Every non-2xx response is `{"error": {code, message, details,
//! request_id}}`. Domain errors translate to their envelope entry here;
//! request-shape failures become `VALIDATION_ERROR` with a field list
//! under `details.errors`.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::adapters::http::request_id::RequestId;
use crate::domain::errors::DomainError;

/// One request-shape failure.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// An error ready to serialize as the envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: serde_json::Value,
    pub request_id: RequestId,
}

impl ApiError {
    pub fn from_domain(error: DomainError, request_id: RequestId) -> Self {
        let (status, code, message, details) = match &error {
            DomainError::ProjectNotFound(_)
            | DomainError::TaskNotFound(_)
            | DomainError::LockNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", error.to_string(), json!({}))
            }
            DomainError::InvalidStatusTransition { from, to } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_STATUS_TRANSITION",
                error.to_string(),
                json!({ "from": from, "to": to }),
            ),
            DomainError::InvalidReadinessState(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_READINESS_STATE",
                message.clone(),
                json!({}),
            ),
            DomainError::LockConflict(message) => {
                (StatusCode::CONFLICT, "LOCK_CONFLICT", message.clone(), json!({}))
            }
            DomainError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                message.clone(),
                json!({}),
            ),
            DomainError::CallerMismatch => (
                StatusCode::FORBIDDEN,
                "VALIDATION_ERROR",
                error.to_string(),
                json!({}),
            ),
            DomainError::Database(_) | DomainError::Serialization(_) => {
                tracing::error!(%error, "Unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    json!({}),
                )
            }
        };
        Self { status, code, message, details, request_id }
    }

    /// Request-shape validation failure with a field list.
    pub fn validation(errors: Vec<FieldError>, request_id: RequestId) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "VALIDATION_ERROR",
            message: "Request validation failed".to_string(),
            details: json!({ "errors": errors }),
            request_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
                "request_id": self.request_id.to_string(),
            }
        });
        (self.status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejection is the error envelope instead of
/// axum's plain-text default.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .copied()
            .unwrap_or_default();

        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(
                vec![FieldError::new("body", rejection.body_text())],
                request_id,
            )),
        }
    }
}

/// Query-string extractor whose rejection is the error envelope.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts.extensions.get::<RequestId>().copied().unwrap_or_default();

        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ApiError::validation(
                vec![FieldError::new("query", rejection.body_text())],
                request_id,
            )),
        }
    }
}
