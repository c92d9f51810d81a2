//! Service layer: business logic over the persistence ports.

pub mod atomic_service;
pub mod discovery_service;
pub mod lock_service;
pub mod project_service;
pub mod task_service;

pub use atomic_service::{
    AtomicService, BreakdownInput, CommitInput, CompleteInput, DimensionScore, FlagRefinementInput,
    RefineInput, SizingInput, SubtaskSpec,
};
pub use discovery_service::{AvailableFilters, DiscoveryService, Page, TaskWithLockInfo};
pub use lock_service::{LockService, Reaper};
pub use project_service::{ProjectDetail, ProjectExport, ProjectService};
pub use task_service::{
    ContextFreshness, CreateTaskInput, TaskContext, TaskService, TaskTreeNode, UpdateTaskInput,
};
