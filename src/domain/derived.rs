//! Derived task state.
//!
//! Nothing here is persisted: every read rebuilds a [`TaskForest`] from flat
//! task and lock rows and recomputes effective points, rolled-up points,
//! unsized-children counts, readiness, and lock activity. Consistency is by
//! construction; migrations never touch derived fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::models::{Readiness, Task, TaskLock, TaskStatus, TaskType};

/// Effective points above this threshold push a task to `needs_breakdown`.
pub const BREAKDOWN_THRESHOLD: i32 = 6;

/// A task with its derived fields, shaped for responses.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedTask {
    pub id: Uuid,
    pub project_id: Uuid,
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

    // Computed fields
    pub effective_points: Option<i32>,
    pub rolled_up_points: Option<i32>,
    pub unsized_children: usize,
    pub readiness: Readiness,
    pub children_count: usize,
    pub is_locked: bool,
}

/// An in-memory index over a set of tasks (a subtree or a whole project)
/// and their locks, supporting the pure derived-state computations.
///
/// The parent chain is acyclic by construction (parents are only assigned
/// at creation and never changed), so the recursive walks terminate.
#[derive(Debug, Default)]
pub struct TaskForest {
    tasks: HashMap<Uuid, Task>,
    children: HashMap<Uuid, Vec<Uuid>>,
    locks: HashMap<Uuid, TaskLock>,
}

impl TaskForest {
    pub fn new(tasks: Vec<Task>, locks: Vec<TaskLock>) -> Self {
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in &tasks {
            if let Some(parent_id) = task.parent_task_id {
                children.entry(parent_id).or_default().push(task.id);
            }
        }
        // Stable child order for tree rendering
        let by_position: HashMap<Uuid, i64> = tasks.iter().map(|t| (t.id, t.position)).collect();
        for ids in children.values_mut() {
            ids.sort_by_key(|id| (by_position.get(id).copied().unwrap_or(0), *id));
        }

        Self {
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
            children,
            locks: locks.into_iter().map(|l| (l.task_id, l)).collect(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn lock(&self, id: Uuid) -> Option<&TaskLock> {
        self.locks.get(&id)
    }

    /// Direct children of a task, ordered by position.
    pub fn children_of(&self, id: Uuid) -> &[Uuid] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn children_count(&self, id: Uuid) -> usize {
        self.children_of(id).len()
    }

    pub fn has_children(&self, id: Uuid) -> bool {
        !self.children_of(id).is_empty()
    }

    /// Tasks in the forest, in no particular order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Sum of `effective_points` over children that have any. `None` for
    /// leaves and for parents with no sized descendants.
    pub fn rolled_up_points(&self, id: Uuid) -> Option<i32> {
        let children = self.children_of(id);
        if children.is_empty() {
            return None;
        }
        let mut total = 0;
        let mut any_sized = false;
        for child in children {
            if let Some(ep) = self.effective_points(*child) {
                total += ep;
                any_sized = true;
            }
        }
        any_sized.then_some(total)
    }

    /// The canonical point value: rolled-up points if any child is sized,
    /// else the task's own points.
    pub fn effective_points(&self, id: Uuid) -> Option<i32> {
        self.rolled_up_points(id)
            .or_else(|| self.get(id).and_then(|t| t.points))
    }

    /// Count of direct children whose stored points are null.
    pub fn unsized_children(&self, id: Uuid) -> usize {
        self.children_of(id)
            .iter()
            .filter(|child| self.get(**child).is_some_and(|t| t.points.is_none()))
            .count()
    }

    /// Ordered readiness rules; the first match wins.
    pub fn readiness(&self, id: Uuid) -> Readiness {
        let Some(task) = self.get(id) else {
            return Readiness::Ready;
        };
        if task.needs_refinement {
            return Readiness::NeedsRefinement;
        }
        if task.points.is_none() && !self.has_children(id) {
            return Readiness::NeedsSizing;
        }
        if self.has_children(id) && self.unsized_children(id) > 0 {
            return Readiness::NeedsBreakdown;
        }
        if self.effective_points(id).is_some_and(|ep| ep > BREAKDOWN_THRESHOLD) {
            return Readiness::NeedsBreakdown;
        }
        if self.has_children(id) {
            return Readiness::BlockedByChildren;
        }
        Readiness::Ready
    }

    pub fn is_locked(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        self.locks.get(&id).is_some_and(|lock| lock.is_active(now))
    }

    /// Walk the full descendant subtree of a task, returning whether every
    /// descendant is terminal and whether at least one is done.
    pub fn descendants_terminal(&self, id: Uuid) -> (bool, bool) {
        let mut all_terminal = true;
        let mut any_done = false;
        let mut queue: Vec<Uuid> = self.children_of(id).to_vec();
        while let Some(current) = queue.pop() {
            if let Some(task) = self.get(current) {
                if !task.status.is_terminal() {
                    all_terminal = false;
                }
                if task.status == TaskStatus::Done {
                    any_done = true;
                }
            }
            queue.extend_from_slice(self.children_of(current));
        }
        (all_terminal, any_done)
    }

    /// Build the enriched view of one task.
    pub fn enrich(&self, id: Uuid, now: DateTime<Utc>) -> Option<EnrichedTask> {
        let task = self.get(id)?;
        Some(EnrichedTask {
            id: task.id,
            project_id: task.project_id,
            parent_task_id: task.parent_task_id,
            name: task.name.clone(),
            description: task.description.clone(),
            context: task.context.clone(),
            task_type: task.task_type,
            status: task.status,
            points: task.points,
            position: task.position,
            created_at: task.created_at,
            updated_at: task.updated_at,
            effective_points: self.effective_points(id),
            rolled_up_points: self.rolled_up_points(id),
            unsized_children: self.unsized_children(id),
            readiness: self.readiness(id),
            children_count: self.children_count(id),
            is_locked: self.is_locked(id, now),
        })
    }
}

/// Sort key for discovery listings: effective points ascending with nulls
/// last, then creation time, then id, for a stable deterministic order.
pub fn discovery_sort_key(task: &EnrichedTask) -> (bool, i32, DateTime<Utc>, Uuid) {
    (
        task.effective_points.is_none(),
        task.effective_points.unwrap_or(0),
        task.created_at,
        task.id,
    )
}
