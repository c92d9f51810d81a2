//! Task lock repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskLock;

/// Repository interface for work-lease persistence.
///
/// The row-level unique constraint on `task_id` is the linearization point
/// for concurrent acquires: `insert` must surface a unique-index violation
/// as a lock conflict so the loser observes the winner's row.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// The lock row for a task, active or not.
    async fn get(&self, task_id: Uuid) -> DomainResult<Option<TaskLock>>;

    /// Insert a new lease. A concurrent duplicate fails with
    /// [`DomainError::LockConflict`](crate::domain::errors::DomainError::LockConflict).
    async fn insert(&self, lock: &TaskLock) -> DomainResult<()>;

    /// Persist heartbeat fields (`last_heartbeat_at`, `expires_at`).
    async fn update(&self, lock: &TaskLock) -> DomainResult<()>;

    /// Delete the lock row for a task. Returns whether a row existed.
    async fn delete(&self, task_id: Uuid) -> DomainResult<bool>;

    /// Bulk-delete leases that expired before `now`; returns the count.
    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<u64>;

    /// Lock rows for a set of tasks (subtree enrichment).
    async fn list_for_tasks(&self, task_ids: &[Uuid]) -> DomainResult<Vec<TaskLock>>;

    /// Lock rows for every task of a project.
    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<TaskLock>>;

    /// All lock rows (cross-project discovery).
    async fn list_all(&self) -> DomainResult<Vec<TaskLock>>;
}
