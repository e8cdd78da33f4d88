//! Orchestration services for the run ledger.

pub mod scheduling;
pub mod shutdown;
pub mod sync;

pub use scheduling::{
    INACTIVE_TASK_MESSAGE, ScheduleRunRequest, SchedulingError, SchedulingResult,
    SchedulingService, UNKNOWN_TASK_MESSAGE, WorkAssignment,
};
pub use shutdown::{
    ClaimGate, DrainOutcome, LATE_RUN_MESSAGE, ORPHANED_RUN_MESSAGE, ShutdownCoordinator,
    ShutdownSettings,
};
pub use sync::{SyncEngine, SyncError, SyncReport};
