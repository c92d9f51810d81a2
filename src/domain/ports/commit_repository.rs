//! Task commit repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskCommit;

/// Repository interface for commit records.
#[async_trait]
pub trait CommitRepository: Send + Sync {
    async fn create(&self, commit: &TaskCommit) -> DomainResult<()>;

    /// Commits for one task ordered by commit time.
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<TaskCommit>>;

    /// Commits across a whole project (export), ordered by commit time.
    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<TaskCommit>>;
}
