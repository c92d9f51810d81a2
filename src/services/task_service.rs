//! Task service implementing the task state model.
//!
//! Every read loads the task's subtree (recursive traversal) and rebuilds
//! derived state through [`TaskForest`]; the status machine and its
//! cross-hierarchy rules (completion gate, parent reopen) live here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::derived::{EnrichedTask, TaskForest};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskCommit, TaskStatus, TaskType, WorkLogEntry};
use crate::domain::ports::{
    CommitRepository, LockRepository, ProjectRepository, TaskRepository, WorkLogRepository,
};

/// Fields accepted when creating a task or subtask.
#[derive(Debug, Clone)]
pub struct CreateTaskInput {
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub task_type: TaskType,
    pub position: Option<i64>,
}

/// Fields accepted on task update; absent fields stay unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub context: Option<String>,
    pub task_type: Option<TaskType>,
}

/// A subtree node for the tree endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTreeNode {
    #[serde(flatten)]
    pub task: EnrichedTask,
    pub children: Vec<TaskTreeNode>,
}

/// Whether a task's captured context still reflects its ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFreshness {
    Fresh,
    Stale,
}

/// An ancestor in the context response: just the fields an implementer
/// needs to re-derive working context.
#[derive(Debug, Clone, Serialize)]
pub struct AncestorItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Everything an agent needs before picking up a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub task: EnrichedTask,
    pub ancestors: Vec<AncestorItem>,
    pub work_log: Vec<WorkLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<TaskCommit>>,
    pub context_captured_at: Option<DateTime<Utc>>,
    pub context_freshness: ContextFreshness,
    pub stale_reasons: Vec<String>,
}

#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    locks: Arc<dyn LockRepository>,
    projects: Arc<dyn ProjectRepository>,
    work_log: Arc<dyn WorkLogRepository>,
    commits: Arc<dyn CommitRepository>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        locks: Arc<dyn LockRepository>,
        projects: Arc<dyn ProjectRepository>,
        work_log: Arc<dyn WorkLogRepository>,
        commits: Arc<dyn CommitRepository>,
    ) -> Self {
        Self { tasks, locks, projects, work_log, commits }
    }

    /// Load a task's subtree and its locks into a forest. 404 when the
    /// root does not exist.
    pub(crate) async fn load_forest(&self, task_id: Uuid) -> DomainResult<TaskForest> {
        let subtree = self.tasks.load_subtree(task_id).await?;
        if subtree.is_empty() {
            return Err(DomainError::TaskNotFound(task_id));
        }
        let ids: Vec<Uuid> = subtree.iter().map(|t| t.id).collect();
        let locks = self.locks.list_for_tasks(&ids).await?;
        Ok(TaskForest::new(subtree, locks))
    }

    /// The enriched view of a single task.
    pub async fn get_enriched(&self, task_id: Uuid) -> DomainResult<EnrichedTask> {
        let forest = self.load_forest(task_id).await?;
        forest
            .enrich(task_id, Utc::now())
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    pub async fn create_task(
        &self,
        project_id: Uuid,
        input: CreateTaskInput,
        parent_task_id: Option<Uuid>,
    ) -> DomainResult<EnrichedTask> {
        if let Some(parent_id) = parent_task_id {
            let parent = self
                .tasks
                .get(parent_id)
                .await?
                .ok_or(DomainError::TaskNotFound(parent_id))?;
            if parent.project_id != project_id {
                return Err(DomainError::Validation(
                    "Parent task belongs to a different project".to_string(),
                ));
            }
        } else if self.projects.get(project_id).await?.is_none() {
            return Err(DomainError::ProjectNotFound(project_id));
        }

        let position = match input.position {
            Some(position) => position,
            None => self.tasks.next_position(project_id, parent_task_id).await?,
        };

        let mut task = Task::new(project_id, input.name, input.task_type)
            .with_description(input.description)
            .with_context(input.context)
            .with_position(position);
        task.parent_task_id = parent_task_id;

        self.tasks.create(&task).await?;
        self.get_enriched(task.id).await
    }

    pub async fn update_task(&self, task_id: Uuid, input: UpdateTaskInput) -> DomainResult<EnrichedTask> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;

        if let Some(name) = input.name {
            task.name = name;
        }
        if let Some(description) = input.description {
            task.description = Some(description);
        }
        if let Some(context) = input.context {
            task.context = Some(context);
        }
        if let Some(task_type) = input.task_type {
            task.task_type = task_type;
        }

        self.tasks.update_details(&task).await?;
        self.get_enriched(task_id).await
    }

    pub async fn delete_task(&self, task_id: Uuid) -> DomainResult<()> {
        self.tasks.delete(task_id).await
    }

    /// Full recursive subtree with enriched nodes, children by position.
    pub async fn tree(&self, task_id: Uuid) -> DomainResult<TaskTreeNode> {
        let forest = self.load_forest(task_id).await?;
        let now = Utc::now();
        build_tree(&forest, task_id, now).ok_or(DomainError::TaskNotFound(task_id))
    }

    /// Walk the parent chain to the root. Returns the chain ordered
    /// root → target, enriched.
    pub async fn ancestry(&self, task_id: Uuid) -> DomainResult<Vec<EnrichedTask>> {
        let chain = self.ancestor_chain(task_id).await?;
        let root_id = chain.last().map_or(task_id, |t| t.id);

        // The root's subtree contains every task on the chain.
        let forest = self.load_forest(root_id).await?;
        let now = Utc::now();
        let enriched: Vec<EnrichedTask> = chain
            .iter()
            .rev()
            .filter_map(|t| forest.enrich(t.id, now))
            .collect();
        Ok(enriched)
    }

    /// Chain ordered target → root. Guards against broken or cyclic parent
    /// links with a visited set.
    async fn ancestor_chain(&self, task_id: Uuid) -> DomainResult<Vec<Task>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current_id = Some(task_id);

        while let Some(id) = current_id {
            if !visited.insert(id) {
                break;
            }
            match self.tasks.get(id).await? {
                Some(task) => {
                    current_id = task.parent_task_id;
                    chain.push(task);
                }
                None => {
                    if id == task_id {
                        return Err(DomainError::TaskNotFound(task_id));
                    }
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// Task context: enriched task, ancestor chain, work log, optional
    /// commits, and a freshness verdict comparing `context_captured_at`
    /// against ancestor updates.
    pub async fn context(&self, task_id: Uuid, include_commits: bool) -> DomainResult<TaskContext> {
        let forest = self.load_forest(task_id).await?;
        let now = Utc::now();
        let task = forest
            .enrich(task_id, now)
            .ok_or(DomainError::TaskNotFound(task_id))?;
        let context_captured_at = forest.get(task_id).and_then(|t| t.context_captured_at);

        let work_log = self.work_log.list_for_task(task_id).await?;
        let commits = if include_commits {
            Some(self.commits.list_for_task(task_id).await?)
        } else {
            None
        };

        let chain = self.ancestor_chain(task_id).await?;
        let ancestors: Vec<AncestorItem> = chain
            .iter()
            .skip(1) // first element is the target itself
            .rev()
            .map(|a| AncestorItem {
                id: a.id,
                name: a.name.clone(),
                description: a.description.clone(),
                context: a.context.clone(),
                updated_at: a.updated_at,
            })
            .collect();

        let mut stale_reasons = Vec::new();
        let context_freshness = match context_captured_at {
            None => {
                stale_reasons.push("Context never captured".to_string());
                ContextFreshness::Stale
            }
            Some(captured_at) => {
                for ancestor in &ancestors {
                    if ancestor.updated_at > captured_at {
                        stale_reasons.push(format!(
                            "{} (updated {})",
                            ancestor.name,
                            ancestor.updated_at.to_rfc3339()
                        ));
                    }
                }
                if stale_reasons.is_empty() {
                    ContextFreshness::Fresh
                } else {
                    ContextFreshness::Stale
                }
            }
        };

        Ok(TaskContext {
            task,
            ancestors,
            work_log,
            commits,
            context_captured_at,
            context_freshness,
            stale_reasons,
        })
    }

    /// Apply a status change through the state machine: transition table,
    /// completion gate over the full descendant subtree, and single-level
    /// parent reopen in the same transaction.
    pub async fn update_status(&self, task_id: Uuid, new_status: TaskStatus) -> DomainResult<EnrichedTask> {
        let forest = self.load_forest(task_id).await?;
        let task = forest.get(task_id).ok_or(DomainError::TaskNotFound(task_id))?;
        let old_status = task.status;

        if new_status == old_status {
            return self.get_enriched(task_id).await;
        }

        if !old_status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStatusTransition { from: old_status, to: new_status });
        }

        if new_status == TaskStatus::Done && forest.has_children(task_id) {
            check_completion_gate(&forest, task_id)?;
        }

        let reopen_parent_id = if old_status == TaskStatus::Done
            && matches!(new_status, TaskStatus::Todo | TaskStatus::Doing)
        {
            match task.parent_task_id {
                Some(parent_id) => {
                    let parent = self.tasks.get(parent_id).await?;
                    parent
                        .filter(|p| p.status == TaskStatus::Done)
                        .map(|p| p.id)
                }
                None => None,
            }
        } else {
            None
        };

        self.tasks.set_status(task_id, new_status, reopen_parent_id).await?;
        self.get_enriched(task_id).await
    }

    /// Validate completion for the atomic complete operation. Returns the
    /// status to write, or `None` when the task is already done (no-op).
    pub(crate) async fn completion_plan(&self, task_id: Uuid) -> DomainResult<Option<TaskStatus>> {
        let forest = self.load_forest(task_id).await?;
        let task = forest.get(task_id).ok_or(DomainError::TaskNotFound(task_id))?;

        if task.status == TaskStatus::Done {
            return Ok(None);
        }
        if !task.status.can_transition_to(TaskStatus::Done) {
            return Err(DomainError::InvalidStatusTransition {
                from: task.status,
                to: TaskStatus::Done,
            });
        }
        if forest.has_children(task_id) {
            check_completion_gate(&forest, task_id)?;
        }
        Ok(Some(TaskStatus::Done))
    }

    pub async fn reorder(&self, task_id: Uuid, new_position: i64) -> DomainResult<EnrichedTask> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;

        self.tasks
            .reorder(task_id, task.project_id, task.parent_task_id, new_position)
            .await?;
        self.get_enriched(task_id).await
    }
}

/// All descendants terminal, at least one done.
fn check_completion_gate(forest: &TaskForest, task_id: Uuid) -> DomainResult<()> {
    let (all_terminal, any_done) = forest.descendants_terminal(task_id);
    if !all_terminal {
        return Err(DomainError::Validation(
            "Cannot complete: not all descendants are terminal (done/wont_do)".to_string(),
        ));
    }
    if !any_done {
        return Err(DomainError::Validation(
            "Cannot complete: at least one descendant must be done".to_string(),
        ));
    }
    Ok(())
}

fn build_tree(forest: &TaskForest, task_id: Uuid, now: DateTime<Utc>) -> Option<TaskTreeNode> {
    let task = forest.enrich(task_id, now)?;
    let children = forest
        .children_of(task_id)
        .iter()
        .filter_map(|child| build_tree(forest, *child, now))
        .collect();
    Some(TaskTreeNode { task, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteCommitRepository, SqliteLockRepository,
        SqliteProjectRepository, SqliteTaskRepository, SqliteWorkLogRepository,
    };
    use crate::domain::models::{Project, Readiness};

    async fn setup() -> (TaskService, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let projects = Arc::new(SqliteProjectRepository::new(pool.clone()));
        let project = Project::new("Test project", None);
        projects.create(&project).await.unwrap();

        let service = TaskService::new(
            Arc::new(SqliteTaskRepository::new(pool.clone())),
            Arc::new(SqliteLockRepository::new(pool.clone())),
            projects,
            Arc::new(SqliteWorkLogRepository::new(pool.clone())),
            Arc::new(SqliteCommitRepository::new(pool)),
        );
        (service, project.id)
    }

    fn input(name: &str) -> CreateTaskInput {
        CreateTaskInput {
            name: name.to_string(),
            description: None,
            context: None,
            task_type: TaskType::Feature,
            position: None,
        }
    }

    #[tokio::test]
    async fn test_create_auto_positions_siblings() {
        let (service, project_id) = setup().await;
        let first = service.create_task(project_id, input("first"), None).await.unwrap();
        let second = service.create_task(project_id, input("second"), None).await.unwrap();

        assert_eq!(first.position, 0);
        assert_eq!(second.position, 1);
    }

    #[tokio::test]
    async fn test_create_subtask_requires_same_project() {
        let (service, project_id) = setup().await;
        let parent = service.create_task(project_id, input("parent"), None).await.unwrap();

        let err = service
            .create_task(Uuid::new_v4(), input("stray"), Some(parent.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_transition_carries_details() {
        let (service, project_id) = setup().await;
        let task = service.create_task(project_id, input("t"), None).await.unwrap();

        let err = service.update_status(task.id, TaskStatus::Done).await.unwrap_err();
        match err {
            DomainError::InvalidStatusTransition { from, to } => {
                assert_eq!(from, TaskStatus::Todo);
                assert_eq!(to, TaskStatus::Done);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_noop_transition_returns_task_unchanged() {
        let (service, project_id) = setup().await;
        let task = service.create_task(project_id, input("t"), None).await.unwrap();

        let result = service.update_status(task.id, TaskStatus::Todo).await.unwrap();
        assert_eq!(result.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_completion_gate_blocks_open_children() {
        let (service, project_id) = setup().await;
        let parent = service.create_task(project_id, input("parent"), None).await.unwrap();
        service
            .create_task(project_id, input("child"), Some(parent.id))
            .await
            .unwrap();

        service.update_status(parent.id, TaskStatus::Doing).await.unwrap();
        let err = service.update_status(parent.id, TaskStatus::Done).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_completion_gate_requires_a_done_descendant() {
        let (service, project_id) = setup().await;
        let parent = service.create_task(project_id, input("parent"), None).await.unwrap();
        let child = service
            .create_task(project_id, input("child"), Some(parent.id))
            .await
            .unwrap();

        service.update_status(child.id, TaskStatus::WontDo).await.unwrap();
        service.update_status(parent.id, TaskStatus::Doing).await.unwrap();
        let err = service.update_status(parent.id, TaskStatus::Done).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_completion_gate_descends_recursively() {
        let (service, project_id) = setup().await;
        let root = service.create_task(project_id, input("root"), None).await.unwrap();
        let mid = service
            .create_task(project_id, input("mid"), Some(root.id))
            .await
            .unwrap();
        let deep = service
            .create_task(project_id, input("deep"), Some(mid.id))
            .await
            .unwrap();

        // Only the middle level is done; the grandchild is still open.
        service.update_status(deep.id, TaskStatus::Doing).await.unwrap();
        service.update_status(mid.id, TaskStatus::Doing).await.unwrap();
        service.update_status(root.id, TaskStatus::Doing).await.unwrap();
        let err = service.update_status(root.id, TaskStatus::Done).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reopening_child_reopens_done_parent() {
        let (service, project_id) = setup().await;
        let parent = service.create_task(project_id, input("parent"), None).await.unwrap();
        let child = service
            .create_task(project_id, input("child"), Some(parent.id))
            .await
            .unwrap();

        service.update_status(child.id, TaskStatus::Doing).await.unwrap();
        service.update_status(child.id, TaskStatus::Done).await.unwrap();
        service.update_status(parent.id, TaskStatus::Doing).await.unwrap();
        service.update_status(parent.id, TaskStatus::Done).await.unwrap();

        service.update_status(child.id, TaskStatus::Todo).await.unwrap();
        let parent_after = service.get_enriched(parent.id).await.unwrap();
        assert_eq!(parent_after.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_tree_orders_children_by_position() {
        let (service, project_id) = setup().await;
        let root = service.create_task(project_id, input("root"), None).await.unwrap();
        let mut late = input("late");
        late.position = Some(5);
        service.create_task(project_id, late, Some(root.id)).await.unwrap();
        let mut early = input("early");
        early.position = Some(1);
        service.create_task(project_id, early, Some(root.id)).await.unwrap();

        let tree = service.tree(root.id).await.unwrap();
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].task.name, "early");
        assert_eq!(tree.children[1].task.name, "late");
    }

    #[tokio::test]
    async fn test_ancestry_ordered_root_to_target() {
        let (service, project_id) = setup().await;
        let root = service.create_task(project_id, input("root"), None).await.unwrap();
        let mid = service
            .create_task(project_id, input("mid"), Some(root.id))
            .await
            .unwrap();
        let leaf = service
            .create_task(project_id, input("leaf"), Some(mid.id))
            .await
            .unwrap();

        let chain = service.ancestry(leaf.id).await.unwrap();
        let names: Vec<_> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["root", "mid", "leaf"]);
    }

    #[tokio::test]
    async fn test_context_reports_never_captured() {
        let (service, project_id) = setup().await;
        let task = service.create_task(project_id, input("t"), None).await.unwrap();

        let context = service.context(task.id, false).await.unwrap();
        assert_eq!(context.context_freshness, ContextFreshness::Stale);
        assert_eq!(context.stale_reasons, ["Context never captured"]);
        assert!(context.commits.is_none());
    }

    #[tokio::test]
    async fn test_parent_readiness_follows_children() {
        let (service, project_id) = setup().await;
        let parent = service.create_task(project_id, input("parent"), None).await.unwrap();
        assert_eq!(parent.readiness, Readiness::NeedsSizing);

        service
            .create_task(project_id, input("child"), Some(parent.id))
            .await
            .unwrap();
        let parent_after = service.get_enriched(parent.id).await.unwrap();
        assert_eq!(parent_after.readiness, Readiness::NeedsBreakdown);
    }
}
