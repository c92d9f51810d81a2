//! SQLite implementation of the LockRepository.
//!
//! The unique index on `task_locks.task_id` is the linearization point for
//! concurrent acquires: whichever insert commits first wins, and the loser
//! sees a unique-violation surfaced as a lock conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LockPurpose, TaskLock};
use crate::domain::ports::LockRepository;

#[derive(Clone)]
pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn get(&self, task_id: Uuid) -> DomainResult<Option<TaskLock>> {
        let row: Option<LockRow> = sqlx::query_as("SELECT * FROM task_locks WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, lock: &TaskLock) -> DomainResult<()> {
        let result = sqlx::query(
            "INSERT INTO task_locks (id, task_id, caller_label, lock_purpose, acquired_at, last_heartbeat_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(lock.id.to_string())
        .bind(lock.task_id.to_string())
        .bind(&lock.caller_label)
        .bind(lock.lock_purpose.as_str())
        .bind(lock.acquired_at.to_rfc3339())
        .bind(lock.last_heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(lock.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(DomainError::LockConflict("Task is already locked".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, lock: &TaskLock) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE task_locks SET last_heartbeat_at = ?, expires_at = ? WHERE task_id = ?",
        )
        .bind(lock.last_heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(lock.expires_at.to_rfc3339())
        .bind(lock.task_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::LockNotFound(lock.task_id));
        }
        Ok(())
    }

    async fn delete(&self, task_id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM task_locks WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM task_locks WHERE expires_at < ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_tasks(&self, task_ids: &[Uuid]) -> DomainResult<Vec<TaskLock>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let query = format!("SELECT * FROM task_locks WHERE task_id IN ({placeholders})");
        let mut q = sqlx::query_as::<_, LockRow>(&query);
        for id in task_ids {
            q = q.bind(id.to_string());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_project(&self, project_id: Uuid) -> DomainResult<Vec<TaskLock>> {
        let rows: Vec<LockRow> = sqlx::query_as(
            r#"SELECT l.* FROM task_locks l
               INNER JOIN tasks t ON t.id = l.task_id
               WHERE t.project_id = ?"#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_all(&self) -> DomainResult<Vec<TaskLock>> {
        let rows: Vec<LockRow> = sqlx::query_as("SELECT * FROM task_locks")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct LockRow {
    id: String,
    task_id: String,
    caller_label: String,
    lock_purpose: String,
    acquired_at: String,
    last_heartbeat_at: Option<String>,
    expires_at: String,
}

impl TryFrom<LockRow> for TaskLock {
    type Error = DomainError;

    fn try_from(row: LockRow) -> Result<Self, Self::Error> {
        let lock_purpose = LockPurpose::from_str(&row.lock_purpose)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid lock_purpose: {}", row.lock_purpose)))?;

        Ok(TaskLock {
            id: super::parse_uuid(&row.id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            caller_label: row.caller_label,
            lock_purpose,
            acquired_at: super::parse_datetime(&row.acquired_at)?,
            last_heartbeat_at: super::parse_optional_datetime(row.last_heartbeat_at)?,
            expires_at: super::parse_datetime(&row.expires_at)?,
        })
    }
}
