//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskCommit, TaskStatus, TaskType, WorkLogEntry};
use crate::domain::ports::TaskRepository;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const INSERT_TASK_SQL: &str = r#"INSERT INTO tasks (id, project_id, parent_task_id, name, description,
    context, task_type, status, points, points_breakdown, sizing_confidence, needs_refinement,
    refinement_notes, context_captured_at, position, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

fn bind_task<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    task: &'q Task,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.context)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(task.points)
        .bind(task.points_breakdown.as_ref().map(ToString::to_string))
        .bind(task.sizing_confidence)
        .bind(task.needs_refinement)
        .bind(&task.refinement_notes)
        .bind(task.context_captured_at.map(|t| t.to_rfc3339()))
        .bind(task.position)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
}

async fn insert_work_log_entry(conn: &mut SqliteConnection, entry: &WorkLogEntry) -> DomainResult<()> {
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
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        bind_task(sqlx::query(INSERT_TASK_SQL), task)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_details(&self, task: &Task) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET name = ?, description = ?, context = ?, task_type = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.context)
        .bind(task.task_type.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn load_subtree(&self, root_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"WITH RECURSIVE subtree AS (
                SELECT * FROM tasks WHERE id = ?
                UNION ALL
                SELECT t.* FROM tasks t JOIN subtree s ON t.parent_task_id = s.id
            )
            SELECT * FROM subtree"#,
        )
        .bind(root_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_project(&self, project_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE project_id = ? ORDER BY position")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_all(&self) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY position")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_roots(&self, project_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE project_id = ? AND parent_task_id IS NULL ORDER BY position",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn next_position(&self, project_id: Uuid, parent_task_id: Option<Uuid>) -> DomainResult<i64> {
        // `IS ?` is SQLite's null-safe comparison, covering the root scope
        let (max,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position), -1) FROM tasks WHERE project_id = ? AND parent_task_id IS ?",
        )
        .bind(project_id.to_string())
        .bind(parent_task_id.map(|id| id.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(max + 1)
    }

    async fn apply_sizing(
        &self,
        task_id: Uuid,
        points: i32,
        breakdown: &serde_json::Value,
        confidence: i32,
        entry: &WorkLogEntry,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE tasks SET points = ?, points_breakdown = ?, sizing_confidence = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(points)
        .bind(breakdown.to_string())
        .bind(confidence)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }

        insert_work_log_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_breakdown(
        &self,
        task_id: Uuid,
        parent_description: Option<&str>,
        subtasks: &[Task],
        entry: &WorkLogEntry,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(description) = parent_description {
            let result = sqlx::query("UPDATE tasks SET description = ?, updated_at = ? WHERE id = ?")
                .bind(description)
                .bind(Utc::now().to_rfc3339())
                .bind(task_id.to_string())
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DomainError::TaskNotFound(task_id));
            }
        }

        for subtask in subtasks {
            bind_task(sqlx::query(INSERT_TASK_SQL), subtask)
                .execute(&mut *tx)
                .await?;
        }

        insert_work_log_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_refinement(
        &self,
        task_id: Uuid,
        description: Option<&str>,
        context: Option<&str>,
        context_captured_at: Option<DateTime<Utc>>,
        entry: &WorkLogEntry,
    ) -> DomainResult<()> {
        let mut query = String::from("UPDATE tasks SET needs_refinement = 0, updated_at = ?");
        if description.is_some() {
            query.push_str(", description = ?");
        }
        if context.is_some() {
            query.push_str(", context = ?");
        }
        if context_captured_at.is_some() {
            query.push_str(", context_captured_at = ?");
        }
        query.push_str(" WHERE id = ?");

        let mut tx = self.pool.begin().await?;

        let mut q = sqlx::query(&query).bind(Utc::now().to_rfc3339());
        if let Some(description) = description {
            q = q.bind(description);
        }
        if let Some(context) = context {
            q = q.bind(context);
        }
        if let Some(captured_at) = context_captured_at {
            q = q.bind(captured_at.to_rfc3339());
        }
        let result = q.bind(task_id.to_string()).execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }

        insert_work_log_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_refinement_flag(&self, task_id: Uuid, notes: &str) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET needs_refinement = 1, refinement_notes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(notes)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn apply_completion(
        &self,
        task_id: Uuid,
        entry: &WorkLogEntry,
        commits: &[TaskCommit],
        new_status: Option<TaskStatus>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        insert_work_log_entry(&mut tx, entry).await?;

        for commit in commits {
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
            .execute(&mut *tx)
            .await?;
        }

        if let Some(status) = new_status {
            let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now().to_rfc3339())
                .bind(task_id.to_string())
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DomainError::TaskNotFound(task_id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        reopen_parent_id: Option<Uuid>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }

        if let Some(parent_id) = reopen_parent_id {
            sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
                .bind(TaskStatus::Todo.as_str())
                .bind(&now)
                .bind(parent_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reorder(
        &self,
        task_id: Uuid,
        project_id: Uuid,
        parent_task_id: Option<Uuid>,
        new_position: i64,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE tasks SET position = position + 1
             WHERE project_id = ? AND parent_task_id IS ? AND position >= ? AND id != ?",
        )
        .bind(project_id.to_string())
        .bind(parent_task_id.map(|id| id.to_string()))
        .bind(new_position)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("UPDATE tasks SET position = ?, updated_at = ? WHERE id = ?")
            .bind(new_position)
            .bind(&now)
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task_id));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    project_id: String,
    parent_task_id: Option<String>,
    name: String,
    description: Option<String>,
    context: Option<String>,
    task_type: String,
    status: String,
    points: Option<i32>,
    points_breakdown: Option<String>,
    sizing_confidence: Option<i32>,
    needs_refinement: bool,
    refinement_notes: Option<String>,
    context_captured_at: Option<String>,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let task_type = TaskType::from_str(&row.task_type)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid task_type: {}", row.task_type)))?;
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;

        Ok(Task {
            id: super::parse_uuid(&row.id)?,
            project_id: super::parse_uuid(&row.project_id)?,
            parent_task_id: super::parse_optional_uuid(row.parent_task_id)?,
            name: row.name,
            description: row.description,
            context: row.context,
            task_type,
            status,
            points: row.points,
            points_breakdown: super::parse_optional_json(row.points_breakdown)?,
            sizing_confidence: row.sizing_confidence,
            needs_refinement: row.needs_refinement,
            refinement_notes: row.refinement_notes,
            context_captured_at: super::parse_optional_datetime(row.context_captured_at)?,
            position: row.position,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}
