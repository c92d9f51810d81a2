//! Project service: CRUD, detail aggregates, and the export envelope.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::derived::{EnrichedTask, TaskForest};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Project, TaskCommit, TaskStatus, TaskType, WorkLogEntry};
use crate::domain::ports::{
    CommitRepository, LockRepository, ProjectRepository, TaskRepository, WorkLogRepository,
};

/// A project plus its task/point aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub task_count: i64,
    pub points_total: i64,
    pub points_completed: i64,
}

/// One task in the export: stored fields plus inlined history. No locks,
/// no derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct ExportTask {
    pub id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub points: Option<i32>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub work_log_entries: Vec<WorkLogEntry>,
    pub commits: Vec<TaskCommit>,
}

/// The export envelope for a whole project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectExport {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub tasks: Vec<ExportTask>,
}

#[derive(Clone)]
pub struct ProjectService {
    projects: Arc<dyn ProjectRepository>,
    tasks: Arc<dyn TaskRepository>,
    locks: Arc<dyn LockRepository>,
    work_log: Arc<dyn WorkLogRepository>,
    commits: Arc<dyn CommitRepository>,
}

impl ProjectService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        tasks: Arc<dyn TaskRepository>,
        locks: Arc<dyn LockRepository>,
        work_log: Arc<dyn WorkLogRepository>,
        commits: Arc<dyn CommitRepository>,
    ) -> Self {
        Self { projects, tasks, locks, work_log, commits }
    }

    async fn require_project(&self, project_id: Uuid) -> DomainResult<Project> {
        self.projects
            .get(project_id)
            .await?
            .ok_or(DomainError::ProjectNotFound(project_id))
    }

    pub async fn create(&self, name: String, description: Option<String>) -> DomainResult<Project> {
        let project = Project::new(name, description);
        self.projects.create(&project).await?;
        Ok(project)
    }

    pub async fn list(&self) -> DomainResult<Vec<Project>> {
        self.projects.list().await
    }

    pub async fn detail(&self, project_id: Uuid) -> DomainResult<ProjectDetail> {
        let project = self.require_project(project_id).await?;
        let stats = self.projects.stats(project_id).await?;
        Ok(ProjectDetail {
            project,
            task_count: stats.task_count,
            points_total: stats.points_total,
            points_completed: stats.points_completed,
        })
    }

    pub async fn update(
        &self,
        project_id: Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> DomainResult<Project> {
        let mut project = self.require_project(project_id).await?;
        if let Some(name) = name {
            project.name = name;
        }
        if let Some(description) = description {
            project.description = Some(description);
        }
        self.projects.update(&project).await?;
        self.require_project(project_id).await
    }

    pub async fn delete(&self, project_id: Uuid) -> DomainResult<()> {
        self.require_project(project_id).await?;
        self.projects.delete(project_id).await
    }

    /// Root tasks of a project, enriched, ordered by position.
    pub async fn root_tasks(&self, project_id: Uuid) -> DomainResult<Vec<EnrichedTask>> {
        self.require_project(project_id).await?;
        let tasks = self.tasks.list_by_project(project_id).await?;
        let locks = self.locks.list_for_project(project_id).await?;
        let forest = TaskForest::new(tasks, locks);
        let now = Utc::now();

        let mut roots: Vec<EnrichedTask> = forest
            .tasks()
            .filter(|t| t.parent_task_id.is_none())
            .filter_map(|t| forest.enrich(t.id, now))
            .collect();
        roots.sort_by_key(|t| (t.position, t.id));
        Ok(roots)
    }

    /// The full export envelope: every task of the project (ordered by
    /// position) with its work-log entries and commits inlined.
    pub async fn export(&self, project_id: Uuid) -> DomainResult<ProjectExport> {
        let project = self.require_project(project_id).await?;

        let tasks = self.tasks.list_by_project(project_id).await?;
        let mut entries_by_task: HashMap<Uuid, Vec<WorkLogEntry>> = HashMap::new();
        for entry in self.work_log.list_for_project(project_id).await? {
            entries_by_task.entry(entry.task_id).or_default().push(entry);
        }
        let mut commits_by_task: HashMap<Uuid, Vec<TaskCommit>> = HashMap::new();
        for commit in self.commits.list_for_project(project_id).await? {
            commits_by_task.entry(commit.task_id).or_default().push(commit);
        }

        let export_tasks = tasks
            .into_iter()
            .map(|t| ExportTask {
                work_log_entries: entries_by_task.remove(&t.id).unwrap_or_default(),
                commits: commits_by_task.remove(&t.id).unwrap_or_default(),
                id: t.id,
                parent_task_id: t.parent_task_id,
                name: t.name,
                description: t.description,
                context: t.context,
                task_type: t.task_type,
                status: t.status,
                points: t.points,
                position: t.position,
                created_at: t.created_at,
                updated_at: t.updated_at,
            })
            .collect();

        Ok(ProjectExport {
            id: project.id,
            name: project.name,
            description: project.description,
            created_at: project.created_at,
            updated_at: project.updated_at,
            exported_at: Utc::now(),
            tasks: export_tasks,
        })
    }
}
