//! Discovery: the filtered, ranked views that drive agent pickup.
//!
//! Readiness and lock state are only expressible over derived state, so
//! every view loads its candidate set with enough of the forest to
//! recompute them, post-filters, and sorts by the deterministic priority
//! `(effective_points asc nulls-last, created_at asc, id asc)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::derived::{discovery_sort_key, EnrichedTask, TaskForest};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LockPurpose, Readiness, TaskStatus};
use crate::domain::ports::{LockRepository, ProjectRepository, TaskRepository};

/// Validated pagination window: `limit` 1..=200 (default 50), `offset` >= 0.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

/// An in-progress task decorated with its active lock, if any.
#[derive(Debug, Clone, Serialize)]
pub struct TaskWithLockInfo {
    #[serde(flatten)]
    pub task: EnrichedTask,
    pub lock_caller_label: Option<String>,
    pub lock_purpose: Option<LockPurpose>,
    pub lock_expires_at: Option<DateTime<Utc>>,
}

/// Optional filters for the `available` selector.
#[derive(Debug, Clone, Default)]
pub struct AvailableFilters {
    pub project_id: Option<Uuid>,
    pub task_type: Option<String>,
    pub min_points: Option<i32>,
    pub max_points: Option<i32>,
}

#[derive(Clone)]
pub struct DiscoveryService {
    tasks: Arc<dyn TaskRepository>,
    locks: Arc<dyn LockRepository>,
    projects: Arc<dyn ProjectRepository>,
}

impl DiscoveryService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        locks: Arc<dyn LockRepository>,
        projects: Arc<dyn ProjectRepository>,
    ) -> Self {
        Self { tasks, locks, projects }
    }

    async fn project_forest(&self, project_id: Uuid) -> DomainResult<TaskForest> {
        if self.projects.get(project_id).await?.is_none() {
            return Err(DomainError::ProjectNotFound(project_id));
        }
        let tasks = self.tasks.list_by_project(project_id).await?;
        let locks = self.locks.list_for_project(project_id).await?;
        Ok(TaskForest::new(tasks, locks))
    }

    /// Todo tasks that are ready for implementation.
    pub async fn backlog(&self, project_id: Uuid, page: Page) -> DomainResult<Vec<EnrichedTask>> {
        let forest = self.project_forest(project_id).await?;
        let now = Utc::now();

        let mut entries: Vec<EnrichedTask> = forest
            .tasks()
            .filter(|t| t.status == TaskStatus::Todo)
            .filter_map(|t| forest.enrich(t.id, now))
            .filter(|e| e.readiness == Readiness::Ready)
            .collect();
        Ok(paginate(&mut entries, page))
    }

    /// Doing tasks, each decorated with its active lock when present.
    pub async fn in_progress(&self, project_id: Uuid, page: Page) -> DomainResult<Vec<TaskWithLockInfo>> {
        let forest = self.project_forest(project_id).await?;
        let now = Utc::now();

        let mut entries: Vec<TaskWithLockInfo> = forest
            .tasks()
            .filter(|t| t.status == TaskStatus::Doing)
            .filter_map(|t| {
                let enriched = forest.enrich(t.id, now)?;
                let lock = forest.lock(t.id).filter(|l| l.is_active(now));
                Some(TaskWithLockInfo {
                    lock_caller_label: lock.map(|l| l.caller_label.clone()),
                    lock_purpose: lock.map(|l| l.lock_purpose),
                    lock_expires_at: lock.map(|l| l.expires_at),
                    task: enriched,
                })
            })
            .collect();

        entries.sort_by_key(|e| discovery_sort_key(&e.task));
        let window = entries
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(window)
    }

    /// Tasks flagged for refinement or sized with low confidence.
    pub async fn needs_refinement(&self, project_id: Uuid, page: Page) -> DomainResult<Vec<EnrichedTask>> {
        let forest = self.project_forest(project_id).await?;
        let now = Utc::now();

        let mut entries: Vec<EnrichedTask> = forest
            .tasks()
            .filter(|t| t.needs_refinement || t.sizing_confidence.is_some_and(|c| c <= 2))
            .filter_map(|t| forest.enrich(t.id, now))
            .collect();
        Ok(paginate(&mut entries, page))
    }

    /// The operation-scoped pickup view. Unknown operations yield an empty
    /// list; locked tasks are always excluded.
    pub async fn available(
        &self,
        operation: &str,
        filters: AvailableFilters,
        page: Page,
    ) -> DomainResult<Vec<EnrichedTask>> {
        // project_id here is a filter, not a resource path: an unknown
        // project yields an empty list rather than 404
        let forest = match filters.project_id {
            Some(project_id) => {
                let tasks = self.tasks.list_by_project(project_id).await?;
                let locks = self.locks.list_for_project(project_id).await?;
                TaskForest::new(tasks, locks)
            }
            None => {
                let tasks = self.tasks.list_all().await?;
                let locks = self.locks.list_all().await?;
                TaskForest::new(tasks, locks)
            }
        };
        let now = Utc::now();

        let mut entries: Vec<EnrichedTask> = forest
            .tasks()
            .filter(|t| match operation {
                "sizing" => t.points.is_none() && !forest.has_children(t.id),
                "breakdown" => {
                    t.status == TaskStatus::Todo && forest.readiness(t.id) == Readiness::NeedsBreakdown
                }
                "implementation" => {
                    t.status == TaskStatus::Todo && forest.readiness(t.id) == Readiness::Ready
                }
                _ => false,
            })
            .filter(|t| !forest.is_locked(t.id, now))
            .filter_map(|t| forest.enrich(t.id, now))
            .collect();

        if let Some(task_type) = &filters.task_type {
            entries.retain(|e| e.task_type.as_str() == task_type);
        }
        if let Some(min_points) = filters.min_points {
            entries.retain(|e| e.effective_points.is_some_and(|ep| ep >= min_points));
        }
        if let Some(max_points) = filters.max_points {
            entries.retain(|e| e.effective_points.is_some_and(|ep| ep <= max_points));
        }

        Ok(paginate(&mut entries, page))
    }
}

fn paginate(entries: &mut Vec<EnrichedTask>, page: Page) -> Vec<EnrichedTask> {
    entries.sort_by_key(discovery_sort_key);
    entries
        .drain(..)
        .skip(page.offset)
        .take(page.limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteLockRepository, SqliteProjectRepository,
        SqliteTaskRepository,
    };
    use crate::domain::models::{Project, Task, TaskLock, TaskType};
    use crate::domain::ports::{LockRepository as _, ProjectRepository as _, TaskRepository as _};

    struct Harness {
        discovery: DiscoveryService,
        tasks: Arc<SqliteTaskRepository>,
        locks: Arc<SqliteLockRepository>,
        project_id: Uuid,
    }

    async fn setup() -> Harness {
        let pool = create_migrated_test_pool().await.unwrap();
        let projects = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let project = Project::new("Test project", None);
        projects.create(&project).await.unwrap();

        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
        Harness {
            discovery: DiscoveryService::new(tasks.clone(), locks.clone(), projects),
            tasks,
            locks,
            project_id: project.id,
        }
    }

    async fn seed(h: &Harness, name: &str, points: Option<i32>, status: TaskStatus) -> Task {
        let mut task = Task::new(h.project_id, name, TaskType::Feature).with_status(status);
        task.points = points;
        h.tasks.create(&task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn test_backlog_filters_to_ready_todo() {
        let h = setup().await;
        seed(&h, "ready", Some(3), TaskStatus::Todo).await;
        seed(&h, "unsized", None, TaskStatus::Todo).await;
        seed(&h, "doing", Some(2), TaskStatus::Doing).await;
        seed(&h, "oversized", Some(8), TaskStatus::Todo).await;

        let backlog = h.discovery.backlog(h.project_id, Page::default()).await.unwrap();
        let names: Vec<_> = backlog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ready"]);
    }

    #[tokio::test]
    async fn test_backlog_sorted_points_then_creation() {
        let h = setup().await;
        seed(&h, "five", Some(5), TaskStatus::Todo).await;
        seed(&h, "two", Some(2), TaskStatus::Todo).await;
        seed(&h, "three", Some(3), TaskStatus::Todo).await;

        let backlog = h.discovery.backlog(h.project_id, Page::default()).await.unwrap();
        let names: Vec<_> = backlog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["two", "three", "five"]);

        let second_page = h
            .discovery
            .backlog(h.project_id, Page { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].name, "three");
    }

    #[tokio::test]
    async fn test_in_progress_decorates_active_locks() {
        let h = setup().await;
        let locked = seed(&h, "locked", Some(2), TaskStatus::Doing).await;
        seed(&h, "bare", Some(3), TaskStatus::Doing).await;
        h.locks
            .insert(&TaskLock::new(locked.id, "agent-1", LockPurpose::Implementation, Utc::now()))
            .await
            .unwrap();

        let in_progress = h.discovery.in_progress(h.project_id, Page::default()).await.unwrap();
        assert_eq!(in_progress.len(), 2);
        assert_eq!(in_progress[0].task.name, "locked");
        assert_eq!(in_progress[0].lock_caller_label.as_deref(), Some("agent-1"));
        assert_eq!(in_progress[0].lock_purpose, Some(LockPurpose::Implementation));
        assert!(in_progress[1].lock_caller_label.is_none());
    }

    #[tokio::test]
    async fn test_needs_refinement_unions_flag_and_low_confidence() {
        let h = setup().await;
        let mut flagged = Task::new(h.project_id, "flagged", TaskType::Feature);
        flagged.needs_refinement = true;
        h.tasks.create(&flagged).await.unwrap();

        let mut shaky = Task::new(h.project_id, "shaky", TaskType::Feature).with_points(2);
        shaky.sizing_confidence = Some(2);
        h.tasks.create(&shaky).await.unwrap();

        let mut solid = Task::new(h.project_id, "solid", TaskType::Feature).with_points(2);
        solid.sizing_confidence = Some(5);
        h.tasks.create(&solid).await.unwrap();

        let listed = h
            .discovery
            .needs_refinement(h.project_id, Page::default())
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"flagged"));
        assert!(names.contains(&"shaky"));
        assert!(!names.contains(&"solid"));
    }

    #[tokio::test]
    async fn test_available_sizing_lists_unsized_leaves() {
        let h = setup().await;
        let parent = seed(&h, "parent", None, TaskStatus::Todo).await;
        let child = Task::new(h.project_id, "child", TaskType::Feature).with_parent(parent.id);
        h.tasks.create(&child).await.unwrap();
        seed(&h, "sized", Some(2), TaskStatus::Todo).await;

        let available = h
            .discovery
            .available("sizing", AvailableFilters::default(), Page::default())
            .await
            .unwrap();
        let names: Vec<_> = available.iter().map(|e| e.name.as_str()).collect();
        // The parent has children, the sized one has points; only the leaf qualifies
        assert_eq!(names, ["child"]);
    }

    #[tokio::test]
    async fn test_available_excludes_locked_tasks() {
        let h = setup().await;
        let a = seed(&h, "a", None, TaskStatus::Todo).await;
        seed(&h, "b", None, TaskStatus::Todo).await;
        h.locks
            .insert(&TaskLock::new(a.id, "agent-1", LockPurpose::Sizing, Utc::now()))
            .await
            .unwrap();

        let available = h
            .discovery
            .available("sizing", AvailableFilters::default(), Page::default())
            .await
            .unwrap();
        let names: Vec<_> = available.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b"]);
    }

    #[tokio::test]
    async fn test_available_point_and_type_filters() {
        let h = setup().await;
        seed(&h, "small", Some(2), TaskStatus::Todo).await;
        seed(&h, "mid", Some(4), TaskStatus::Todo).await;
        let mut bug = Task::new(h.project_id, "buggy", TaskType::Bug).with_points(4);
        bug.status = TaskStatus::Todo;
        h.tasks.create(&bug).await.unwrap();

        let filters = AvailableFilters {
            min_points: Some(3),
            max_points: Some(5),
            ..Default::default()
        };
        let available = h
            .discovery
            .available("implementation", filters, Page::default())
            .await
            .unwrap();
        let names: Vec<_> = available.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"mid"));
        assert!(names.contains(&"buggy"));

        let only_bugs = AvailableFilters {
            task_type: Some("bug".to_string()),
            ..Default::default()
        };
        let available = h
            .discovery
            .available("implementation", only_bugs, Page::default())
            .await
            .unwrap();
        let names: Vec<_> = available.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["buggy"]);
    }

    #[tokio::test]
    async fn test_available_unknown_operation_is_empty() {
        let h = setup().await;
        seed(&h, "a", None, TaskStatus::Todo).await;

        let available = h
            .discovery
            .available("review", AvailableFilters::default(), Page::default())
            .await
            .unwrap();
        assert!(available.is_empty());
    }
}
