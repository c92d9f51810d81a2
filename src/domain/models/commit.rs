//! Task commit domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A VCS commit attached to a task. Immutable after creation; retrieved in
/// `committed_at` order. Hashes are 40-hex strings validated at the
/// transport schema and never re-verified here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCommit {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author: Option<String>,
    pub commit_hash: String,
    pub message: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl TaskCommit {
    pub fn new(
        task_id: Uuid,
        commit_hash: impl Into<String>,
        message: Option<String>,
        author: Option<String>,
        committed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            author,
            commit_hash: commit_hash.into(),
            message,
            committed_at,
        }
    }
}
