//! SQLite implementation of the WorkLogRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Operation, WorkLogEntry};
use crate::domain::ports::WorkLogRepository;

#[derive(Clone)]
pub struct SqliteWorkLogRepository {
    pool: SqlitePool,
}

impl SqliteWorkLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkLogRepository for SqliteWorkLogRepository {
    async fn create(&self, entry: &WorkLogEntry) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO work_log_entries (id, task_id, author, operation, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.task_id.to_string())
        .bind(&entry.author)
        .bind(entry.operation.as_str())
        .bind(&entry.content)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<WorkLogEntry>> {
        let rows: Vec<WorkLogRow> = sqlx::query_as(
            "SELECT * FROM work_log_entries WHERE task_id = ? ORDER BY created_at",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<WorkLogEntry>> {
        let rows: Vec<WorkLogRow> = sqlx::query_as(
            r#"SELECT e.* FROM work_log_entries e
               INNER JOIN tasks t ON t.id = e.task_id
               WHERE t.project_id = ?
               ORDER BY e.created_at"#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct WorkLogRow {
    id: String,
    task_id: String,
    author: Option<String>,
    operation: String,
    content: String,
    created_at: String,
}

impl TryFrom<WorkLogRow> for WorkLogEntry {
    type Error = DomainError;

    fn try_from(row: WorkLogRow) -> Result<Self, Self::Error> {
        let operation = Operation::from_str(&row.operation)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid operation: {}", row.operation)))?;

        Ok(WorkLogEntry {
            id: super::parse_uuid(&row.id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            author: row.author,
            operation,
            content: row.content,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}
