//! Task lock domain model.
//!
//! A lock is a time-bounded lease authorizing one caller to perform one
//! kind of work on a task. At most one lock exists per task (enforced by a
//! unique index); an expired row may linger until reaped or overwritten.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of activity a lease authorizes. Drives both the acquisition
/// precondition and the lease TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPurpose {
    Sizing,
    Breakdown,
    Refinement,
    Implementation,
}

impl LockPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sizing => "sizing",
            Self::Breakdown => "breakdown",
            Self::Refinement => "refinement",
            Self::Implementation => "implementation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sizing" => Some(Self::Sizing),
            "breakdown" => Some(Self::Breakdown),
            "refinement" => Some(Self::Refinement),
            "implementation" => Some(Self::Implementation),
            _ => None,
        }
    }

    /// Lease duration granted on acquire and on every heartbeat.
    pub fn ttl(&self) -> Duration {
        match self {
            Self::Sizing => Duration::minutes(15),
            Self::Breakdown | Self::Refinement => Duration::minutes(30),
            Self::Implementation => Duration::hours(1),
        }
    }
}

/// An exclusive work lease on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLock {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Identity string of the agent or operator holding the lease.
    pub caller_label: String,
    pub lock_purpose: LockPurpose,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl TaskLock {
    /// Create a fresh lease starting at `now` with the purpose's TTL.
    pub fn new(task_id: Uuid, caller_label: impl Into<String>, purpose: LockPurpose, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            caller_label: caller_label.into(),
            lock_purpose: purpose,
            acquired_at: now,
            last_heartbeat_at: None,
            expires_at: now + purpose.ttl(),
        }
    }

    /// A lock is active iff it has not yet expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
