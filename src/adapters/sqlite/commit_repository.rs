//! SQLite implementation of the CommitRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskCommit;
use crate::domain::ports::CommitRepository;

#[derive(Clone)]
pub struct SqliteCommitRepository {
    pool: SqlitePool,
}

impl SqliteCommitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommitRepository for SqliteCommitRepository {
    async fn create(&self, commit: &TaskCommit) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO task_commits (id, task_id, author, commit_hash, message, committed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(commit.id.to_string())
        .bind(commit.task_id.to_string())
        .bind(&commit.author)
        .bind(&commit.commit_hash)
        .bind(&commit.message)
        .bind(commit.committed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<TaskCommit>> {
        let rows: Vec<CommitRow> = sqlx::query_as(
            "SELECT * FROM task_commits WHERE task_id = ? ORDER BY committed_at",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<TaskCommit>> {
        let rows: Vec<CommitRow> = sqlx::query_as(
            r#"SELECT c.* FROM task_commits c
               INNER JOIN tasks t ON t.id = c.task_id
               WHERE t.project_id = ?
               ORDER BY c.committed_at"#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CommitRow {
    id: String,
    task_id: String,
    author: Option<String>,
    commit_hash: String,
    message: Option<String>,
    committed_at: String,
}

impl TryFrom<CommitRow> for TaskCommit {
    type Error = DomainError;

    fn try_from(row: CommitRow) -> Result<Self, Self::Error> {
        Ok(TaskCommit {
            id: super::parse_uuid(&row.id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            author: row.author,
            commit_hash: row.commit_hash,
            message: row.message,
            committed_at: super::parse_datetime(&row.committed_at)?,
        })
    }
}
