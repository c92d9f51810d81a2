//! Task repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskCommit, TaskStatus, WorkLogEntry};

/// Repository interface for task persistence.
///
/// Beyond plain CRUD, this port carries the transactional write bundles of
/// the atomic work operations: each `apply_*` method commits all of its
/// mutations in a single store transaction or none of them. The service
/// layer validates preconditions against derived state first and hands the
/// adapter a fully-decided bundle.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task row by id (no relationships).
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Update mutable detail fields (name, description, context, task type).
    async fn update_details(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task; the store cascades to descendants, locks, work log
    /// entries, and commits.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Load a task and every descendant (recursive traversal). Returns an
    /// empty vector when the root does not exist.
    async fn load_subtree(&self, root_id: Uuid) -> DomainResult<Vec<Task>>;

    /// All tasks of one project.
    async fn list_by_project(&self, project_id: Uuid) -> DomainResult<Vec<Task>>;

    /// All tasks across projects (cross-project discovery).
    async fn list_all(&self) -> DomainResult<Vec<Task>>;

    /// Root tasks of a project, ordered by position.
    async fn list_roots(&self, project_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Next free sibling position within a parent scope:
    /// `COALESCE(MAX(position), -1) + 1` in one query.
    async fn next_position(&self, project_id: Uuid, parent_task_id: Option<Uuid>) -> DomainResult<i64>;

    /// Sizing bundle: store points, breakdown record, and confidence, and
    /// append the sizing work-log entry.
    async fn apply_sizing(
        &self,
        task_id: Uuid,
        points: i32,
        breakdown: &serde_json::Value,
        confidence: i32,
        entry: &WorkLogEntry,
    ) -> DomainResult<()>;

    /// Breakdown bundle: optionally overwrite the parent description,
    /// insert the subtasks, and append the breakdown work-log entry.
    async fn apply_breakdown(
        &self,
        task_id: Uuid,
        parent_description: Option<&str>,
        subtasks: &[Task],
        entry: &WorkLogEntry,
    ) -> DomainResult<()>;

    /// Refinement bundle: overwrite the supplied fields, clear the
    /// refinement flag, and append the refinement work-log entry.
    async fn apply_refinement(
        &self,
        task_id: Uuid,
        description: Option<&str>,
        context: Option<&str>,
        context_captured_at: Option<DateTime<Utc>>,
        entry: &WorkLogEntry,
    ) -> DomainResult<()>;

    /// Set the refinement flag with its notes.
    async fn apply_refinement_flag(&self, task_id: Uuid, notes: &str) -> DomainResult<()>;

    /// Completion bundle: append the implementation work-log entry, insert
    /// the supplied commits, and apply the status change when one is due
    /// (`None` for a no-op completion of an already-done task).
    async fn apply_completion(
        &self,
        task_id: Uuid,
        entry: &WorkLogEntry,
        commits: &[TaskCommit],
        new_status: Option<TaskStatus>,
    ) -> DomainResult<()>;

    /// Status change, optionally reopening the given parent to `todo` in
    /// the same transaction.
    async fn set_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        reopen_parent_id: Option<Uuid>,
    ) -> DomainResult<()>;

    /// Reorder bundle: shift siblings in the parent scope at
    /// `position >= new_position` up by one, then set the target position.
    async fn reorder(
        &self,
        task_id: Uuid,
        project_id: Uuid,
        parent_task_id: Option<Uuid>,
        new_position: i64,
    ) -> DomainResult<()>;
}
