//! Work log repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::WorkLogEntry;

/// Repository interface for the append-only work log.
#[async_trait]
pub trait WorkLogRepository: Send + Sync {
    async fn create(&self, entry: &WorkLogEntry) -> DomainResult<()>;

    /// Entries for one task ordered by creation time.
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<WorkLogEntry>>;

    /// Entries across a whole project (export), ordered by creation time.
    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<WorkLogEntry>>;
}
