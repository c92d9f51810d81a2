//! Domain errors for the Chorus coordination server.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::TaskStatus;

/// Domain-level errors. Each variant maps onto exactly one entry of the
/// transport error envelope taxonomy.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("No lock found for task: {0}")]
    LockNotFound(Uuid),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: TaskStatus, to: TaskStatus },

    #[error("{0}")]
    InvalidReadinessState(String),

    #[error("{0}")]
    LockConflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Caller label does not match lock holder")]
    CallerMismatch,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
