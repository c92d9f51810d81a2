//! Lock service: typed, time-bounded work leases.
//!
//! Acquisition validates a purpose-specific precondition against derived
//! state, lazily reaps an expired row in its way, and relies on the unique
//! index on `task_locks.task_id` to serialize concurrent acquires. A
//! background reaper bulk-deletes expired lock and idempotency rows on a
//! fixed cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::derived::{TaskForest, BREAKDOWN_THRESHOLD};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LockPurpose, Readiness, TaskLock};
use crate::domain::ports::{IdempotencyRepository, LockRepository};
use crate::services::task_service::TaskService;

/// Delay between reaper sweeps.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct LockService {
    task_service: TaskService,
    locks: Arc<dyn LockRepository>,
}

impl LockService {
    pub fn new(task_service: TaskService, locks: Arc<dyn LockRepository>) -> Self {
        Self { task_service, locks }
    }

    /// Acquire a lease on a task for a purpose. An expired leftover row is
    /// reaped in place; an active one conflicts.
    pub async fn acquire(
        &self,
        task_id: Uuid,
        caller_label: &str,
        purpose: LockPurpose,
    ) -> DomainResult<TaskLock> {
        let forest = self.task_service.load_forest(task_id).await?;

        if let Some(existing) = self.locks.get(task_id).await? {
            if existing.is_active(Utc::now()) {
                return Err(DomainError::LockConflict("Task is already locked".to_string()));
            }
            self.locks.delete(task_id).await?;
        }

        validate_precondition(&forest, task_id, purpose)?;

        let lock = TaskLock::new(task_id, caller_label, purpose, Utc::now());
        self.locks.insert(&lock).await?;
        Ok(lock)
    }

    /// Extend a lease by its purpose TTL. Expired leases never resurrect;
    /// the caller must re-acquire.
    pub async fn heartbeat(&self, task_id: Uuid, caller_label: &str) -> DomainResult<TaskLock> {
        let mut lock = self
            .locks
            .get(task_id)
            .await?
            .ok_or(DomainError::LockNotFound(task_id))?;

        let now = Utc::now();
        if !lock.is_active(now) {
            return Err(DomainError::LockConflict("Lock has expired".to_string()));
        }
        if lock.caller_label != caller_label {
            return Err(DomainError::CallerMismatch);
        }

        lock.last_heartbeat_at = Some(now);
        lock.expires_at = now + lock.lock_purpose.ttl();
        self.locks.update(&lock).await?;
        Ok(lock)
    }

    /// Release a lease. Owner-checked unless forced.
    pub async fn release(&self, task_id: Uuid, caller_label: &str, force: bool) -> DomainResult<()> {
        let lock = self
            .locks
            .get(task_id)
            .await?
            .ok_or(DomainError::LockNotFound(task_id))?;

        if !force && lock.caller_label != caller_label {
            return Err(DomainError::CallerMismatch);
        }

        self.locks.delete(task_id).await?;
        Ok(())
    }
}

/// Purpose preconditions over derived state.
fn validate_precondition(forest: &TaskForest, task_id: Uuid, purpose: LockPurpose) -> DomainResult<()> {
    let task = forest.get(task_id).ok_or(DomainError::TaskNotFound(task_id))?;

    match purpose {
        LockPurpose::Sizing => {
            if task.points.is_some() {
                return Err(DomainError::InvalidReadinessState("Task is already sized".to_string()));
            }
        }
        LockPurpose::Breakdown => {
            if task.points.is_none() && !forest.has_children(task_id) {
                return Err(DomainError::InvalidReadinessState(
                    "Task must be sized before breakdown".to_string(),
                ));
            }
            let effective = forest.effective_points(task_id);
            let unsized_count = forest.unsized_children(task_id);
            if effective.is_none_or(|ep| ep <= BREAKDOWN_THRESHOLD) && unsized_count == 0 {
                return Err(DomainError::InvalidReadinessState(
                    "Task does not need breakdown (effective_points <= 6 and no unsized children)"
                        .to_string(),
                ));
            }
        }
        LockPurpose::Refinement => {}
        LockPurpose::Implementation => {
            let readiness = forest.readiness(task_id);
            if readiness != Readiness::Ready {
                return Err(DomainError::InvalidReadinessState(format!(
                    "Task is not ready for implementation (readiness={readiness})"
                )));
            }
        }
    }
    Ok(())
}

/// Background task deleting expired lock and idempotency rows.
///
/// Spawned once at service boot and aborted at shutdown. Errors are logged
/// and swallowed; the loop never exits on its own. The deletes are
/// idempotent, so concurrent reapers (multi-process deployments) are safe.
pub struct Reaper {
    locks: Arc<dyn LockRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
}

impl Reaper {
    pub fn new(locks: Arc<dyn LockRepository>, idempotency: Arc<dyn IdempotencyRepository>) -> Self {
        Self { locks, idempotency }
    }

    /// One sweep: bulk-delete everything that expired before now.
    pub async fn run_once(&self) -> DomainResult<()> {
        let now = Utc::now();
        let lock_count = self.locks.delete_expired(now).await?;
        let idempotency_count = self.idempotency.delete_expired(now).await?;

        if lock_count > 0 {
            tracing::info!(count = lock_count, "Cleaned up expired locks");
        }
        if idempotency_count > 0 {
            tracing::info!(count = idempotency_count, "Cleaned up expired idempotency records");
        }
        Ok(())
    }

    /// Spawn the reap loop. Cancel with `JoinHandle::abort` at shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAP_INTERVAL).await;
                if let Err(error) = self.run_once().await {
                    tracing::error!(%error, "Error during lock/idempotency cleanup");
                }
            }
        })
    }
}
