//! Atomic work operations: sizing, breakdown, refinement, completion.
//!
//! Each operation is one transactional bundle: task mutations, the
//! work-log append, and (for complete) commit inserts either all commit or
//! all roll back. Responses to keyed requests are captured for replay.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::derived::EnrichedTask;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    IdempotencyRecord, Operation, Task, TaskCommit, TaskType, WorkLogEntry,
};
use crate::domain::ports::{
    CommitRepository, IdempotencyRepository, TaskRepository, WorkLogRepository,
};
use crate::services::task_service::TaskService;

/// One scored sizing dimension, 0..=2.
#[derive(Debug, Clone, Deserialize)]
pub struct DimensionScore {
    pub score: i32,
    pub reasoning: String,
}

/// Payload of the size operation: five dimensions summed into points.
#[derive(Debug, Clone, Deserialize)]
pub struct SizingInput {
    pub scope_clarity: DimensionScore,
    pub decision_points: DimensionScore,
    pub context_window_demand: DimensionScore,
    pub verification_complexity: DimensionScore,
    pub domain_specificity: DimensionScore,
    pub confidence: i32,
    #[serde(default)]
    pub risk_factors: Option<Vec<String>>,
    #[serde(default)]
    pub breakdown_suggestions: Option<String>,
    #[serde(default)]
    pub scored_by: Option<String>,
    pub work_log_content: String,
    #[serde(default)]
    pub author: Option<String>,
}

impl SizingInput {
    pub fn dimensions(&self) -> [(&'static str, &DimensionScore); 5] {
        [
            ("scope_clarity", &self.scope_clarity),
            ("decision_points", &self.decision_points),
            ("context_window_demand", &self.context_window_demand),
            ("verification_complexity", &self.verification_complexity),
            ("domain_specificity", &self.domain_specificity),
        ]
    }

    /// The literal sum of the five dimension scores.
    pub fn total(&self) -> i32 {
        self.dimensions().iter().map(|(_, d)| d.score).sum()
    }
}

/// One subtask to create during breakdown.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub task_type: TaskType,
    #[serde(default)]
    pub position: Option<i64>,
}

/// Payload of the breakdown operation.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakdownInput {
    pub subtasks: Vec<SubtaskSpec>,
    #[serde(default)]
    pub parent_description_update: Option<String>,
    pub work_log_content: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Payload of the refine operation.
#[derive(Debug, Clone, Deserialize)]
pub struct RefineInput {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub context_captured_at: Option<DateTime<Utc>>,
    pub work_log_content: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Payload of the flag-refinement operation.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagRefinementInput {
    pub refinement_notes: String,
}

/// One commit supplied with completion (or posted directly).
#[derive(Debug, Clone, Deserialize)]
pub struct CommitInput {
    pub commit_hash: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub committed_at: DateTime<Utc>,
}

/// Payload of the complete operation.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteInput {
    pub work_log_content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub commits: Option<Vec<CommitInput>>,
}

#[derive(Clone)]
pub struct AtomicService {
    task_service: TaskService,
    tasks: Arc<dyn TaskRepository>,
    work_log: Arc<dyn WorkLogRepository>,
    commits: Arc<dyn CommitRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
}

impl AtomicService {
    pub fn new(
        task_service: TaskService,
        tasks: Arc<dyn TaskRepository>,
        work_log: Arc<dyn WorkLogRepository>,
        commits: Arc<dyn CommitRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
    ) -> Self {
        Self { task_service, tasks, work_log, commits, idempotency }
    }

    async fn require_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    /// Size a task: points become the sum of the five dimension scores and
    /// the full scoring record is kept alongside.
    pub async fn size(&self, task_id: Uuid, input: SizingInput) -> DomainResult<EnrichedTask> {
        self.require_task(task_id).await?;

        let total = input.total();
        let mut dimensions = serde_json::Map::new();
        for (name, dimension) in input.dimensions() {
            dimensions.insert(
                name.to_string(),
                serde_json::json!({ "score": dimension.score, "reasoning": dimension.reasoning }),
            );
        }
        let breakdown = serde_json::json!({
            "dimensions": dimensions,
            "total": total,
            "confidence": input.confidence,
            "risk_factors": input.risk_factors,
            "breakdown_suggestions": input.breakdown_suggestions,
            "scored_by": input.scored_by,
            "scored_at": Utc::now().to_rfc3339(),
        });

        let entry = WorkLogEntry::new(task_id, Operation::Sizing, input.work_log_content, input.author);
        self.tasks
            .apply_sizing(task_id, total, &breakdown, input.confidence, &entry)
            .await?;
        self.task_service.get_enriched(task_id).await
    }

    /// Break a task into subtasks. The parent's own points are never
    /// touched; new unsized children drive its readiness to
    /// `needs_breakdown` until they are sized.
    pub async fn breakdown(&self, task_id: Uuid, input: BreakdownInput) -> DomainResult<EnrichedTask> {
        let task = self.require_task(task_id).await?;

        // One query decides the base position for all implicit placements
        let base = self.tasks.next_position(task.project_id, Some(task_id)).await?;

        let subtasks: Vec<Task> = input
            .subtasks
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let position = spec.position.unwrap_or(base + i as i64);
                Task::new(task.project_id, spec.name.clone(), spec.task_type)
                    .with_parent(task_id)
                    .with_description(spec.description.clone())
                    .with_context(spec.context.clone())
                    .with_position(position)
            })
            .collect();

        let entry = WorkLogEntry::new(task_id, Operation::Breakdown, input.work_log_content, input.author);
        self.tasks
            .apply_breakdown(task_id, input.parent_description_update.as_deref(), &subtasks, &entry)
            .await?;
        self.task_service.get_enriched(task_id).await
    }

    /// Refine a task: overwrite supplied context fields and clear the
    /// refinement flag.
    pub async fn refine(&self, task_id: Uuid, input: RefineInput) -> DomainResult<EnrichedTask> {
        self.require_task(task_id).await?;

        let entry = WorkLogEntry::new(task_id, Operation::Refinement, input.work_log_content, input.author);
        self.tasks
            .apply_refinement(
                task_id,
                input.description.as_deref(),
                input.context.as_deref(),
                input.context_captured_at,
                &entry,
            )
            .await?;
        self.task_service.get_enriched(task_id).await
    }

    /// Flag a task as needing refinement. No work-log entry is written.
    pub async fn flag_refinement(
        &self,
        task_id: Uuid,
        input: FlagRefinementInput,
    ) -> DomainResult<EnrichedTask> {
        self.require_task(task_id).await?;
        self.tasks
            .apply_refinement_flag(task_id, &input.refinement_notes)
            .await?;
        self.task_service.get_enriched(task_id).await
    }

    /// Complete a task: implementation work-log entry, supplied commits,
    /// and the gated transition to done, all in one transaction.
    pub async fn complete(&self, task_id: Uuid, input: CompleteInput) -> DomainResult<EnrichedTask> {
        let new_status = self.task_service.completion_plan(task_id).await?;

        let entry = WorkLogEntry::new(
            task_id,
            Operation::Implementation,
            input.work_log_content,
            input.author,
        );
        let commits: Vec<TaskCommit> = input
            .commits
            .unwrap_or_default()
            .into_iter()
            .map(|c| TaskCommit::new(task_id, c.commit_hash, c.message, c.author, c.committed_at))
            .collect();

        self.tasks
            .apply_completion(task_id, &entry, &commits, new_status)
            .await?;
        self.task_service.get_enriched(task_id).await
    }

    pub async fn create_work_log_entry(
        &self,
        task_id: Uuid,
        operation: Operation,
        content: String,
        author: Option<String>,
    ) -> DomainResult<WorkLogEntry> {
        self.require_task(task_id).await?;
        let entry = WorkLogEntry::new(task_id, operation, content, author);
        self.work_log.create(&entry).await?;
        Ok(entry)
    }

    pub async fn get_work_log(&self, task_id: Uuid) -> DomainResult<Vec<WorkLogEntry>> {
        self.require_task(task_id).await?;
        self.work_log.list_for_task(task_id).await
    }

    pub async fn create_commit(&self, task_id: Uuid, input: CommitInput) -> DomainResult<TaskCommit> {
        self.require_task(task_id).await?;
        let commit = TaskCommit::new(task_id, input.commit_hash, input.message, input.author, input.committed_at);
        self.commits.create(&commit).await?;
        Ok(commit)
    }

    pub async fn get_commits(&self, task_id: Uuid) -> DomainResult<Vec<TaskCommit>> {
        self.require_task(task_id).await?;
        self.commits.list_for_task(task_id).await
    }

    /// An unexpired captured response for a scoped key, if any.
    pub async fn check_idempotency(&self, scoped_key: &str) -> DomainResult<Option<IdempotencyRecord>> {
        let record = self.idempotency.get(scoped_key).await?;
        Ok(record.filter(|r| !r.is_expired(Utc::now())))
    }

    /// Capture a response for replay. A concurrent duplicate resolves to
    /// the stored winner's record.
    pub async fn store_idempotency(
        &self,
        scoped_key: &str,
        status_code: u16,
        response_body: serde_json::Value,
    ) -> DomainResult<IdempotencyRecord> {
        let record = IdempotencyRecord::new(scoped_key, status_code, response_body);
        self.idempotency.insert(&record).await
    }
}
