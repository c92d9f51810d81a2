//! Project repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Project;

/// Point aggregates over a project's task forest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectStats {
    pub task_count: i64,
    pub points_total: i64,
    pub points_completed: i64,
}

/// Repository interface for project persistence.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Project>>;

    /// All projects ordered by creation time.
    async fn list(&self) -> DomainResult<Vec<Project>>;

    async fn update(&self, project: &Project) -> DomainResult<()>;

    /// Delete a project; the store cascades to its task forest.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Task count and point totals for the project detail view.
    async fn stats(&self, project_id: Uuid) -> DomainResult<ProjectStats>;
}
