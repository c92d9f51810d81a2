//! Work log domain model: append-only history per task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of work an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Sizing,
    Breakdown,
    Refinement,
    Implementation,
    Note,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sizing => "sizing",
            Self::Breakdown => "breakdown",
            Self::Refinement => "refinement",
            Self::Implementation => "implementation",
            Self::Note => "note",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sizing" => Some(Self::Sizing),
            "breakdown" => Some(Self::Breakdown),
            "refinement" => Some(Self::Refinement),
            "implementation" => Some(Self::Implementation),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// One immutable history record on a task. Never mutated after creation;
/// retrieved in `created_at` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLogEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author: Option<String>,
    pub operation: Operation,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl WorkLogEntry {
    pub fn new(
        task_id: Uuid,
        operation: Operation,
        content: impl Into<String>,
        author: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            author,
            operation,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
