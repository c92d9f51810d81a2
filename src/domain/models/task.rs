//! Task domain model.
//!
//! Tasks form a forest under projects: every task may have child tasks in
//! the same project, and most state that drives agent pickup (effective
//! points, readiness) is derived from the subtree rather than stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be picked up
    Todo,
    /// Task is actively being worked
    Doing,
    /// Task finished successfully
    Done,
    /// Task was abandoned deliberately
    WontDo,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::WontDo => "wont_do",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            "wont_do" => Some(Self::WontDo),
            _ => None,
        }
    }

    /// Terminal statuses do not block a parent's completion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::WontDo)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Todo => &[Self::Doing, Self::WontDo],
            Self::Doing => &[Self::Done, Self::Todo, Self::WontDo],
            Self::Done => &[Self::Todo, Self::WontDo],
            Self::WontDo => &[Self::Todo],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// New user-visible behavior
    Feature,
    /// Defect in existing behavior
    Bug,
    /// Internal improvement with no behavior change
    TechDebt,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::TechDebt => "tech_debt",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "feature" => Some(Self::Feature),
            "bug" => Some(Self::Bug),
            "tech_debt" => Some(Self::TechDebt),
            _ => None,
        }
    }
}

/// Derived suitability of a task for pickup, computed from its fields and
/// its children. Ordered: the first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Flagged for refinement; dominates every other rule
    NeedsRefinement,
    /// Unsized leaf
    NeedsSizing,
    /// Unsized children, or effective points above the breakdown threshold
    NeedsBreakdown,
    /// Sized children must finish first
    BlockedByChildren,
    /// Eligible for implementation pickup
    Ready,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsRefinement => "needs_refinement",
            Self::NeedsSizing => "needs_sizing",
            Self::NeedsBreakdown => "needs_breakdown",
            Self::BlockedByChildren => "blocked_by_children",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in a project's task forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Stored size in points, 0..=10 when set. Parents usually stay unsized
    /// and report rolled-up points instead.
    pub points: Option<i32>,
    /// Opaque record of the sizing that produced `points`.
    pub points_breakdown: Option<serde_json::Value>,
    /// Scorer confidence, 0..=5 when set.
    pub sizing_confidence: Option<i32>,
    pub needs_refinement: bool,
    pub refinement_notes: Option<String>,
    pub context_captured_at: Option<DateTime<Utc>>,
    /// Order among siblings. Gaps are permitted and never compacted.
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new root task with defaults.
    pub fn new(project_id: Uuid, name: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            parent_task_id: None,
            name: name.into(),
            description: None,
            context: None,
            task_type,
            status: TaskStatus::default(),
            points: None,
            points_breakdown: None,
            sizing_confidence: None,
            needs_refinement: false,
            refinement_notes: None,
            context_captured_at: None,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    pub fn with_points(mut self, points: i32) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}
