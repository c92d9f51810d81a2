//! Domain models for the Chorus coordination server.

pub mod commit;
pub mod idempotency;
pub mod lock;
pub mod project;
pub mod task;
pub mod work_log;

pub use commit::TaskCommit;
pub use idempotency::IdempotencyRecord;
pub use lock::{LockPurpose, TaskLock};
pub use project::Project;
pub use task::{Readiness, Task, TaskStatus, TaskType};
pub use work_log::{Operation, WorkLogEntry};
