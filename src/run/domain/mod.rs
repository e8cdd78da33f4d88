//! Domain model for the run ledger.
//!
//! Runs move through `Pending -> Running -> Finished | Failed`; every other
//! transition is rejected here before any adapter touches storage.

mod error;
mod ids;
mod page;
mod run;
mod task;
mod task_result;

pub use error::{
    ParseRunReasonError, ParseRunStatusError, ParseTaskResultStateError, RunDomainError,
};
pub use ids::{RunId, TaskHash, TaskName};
pub use page::{Page, PageRequest, RunFilter, TaskResultFilter};
pub use run::{NewRun, PersistedRunData, Run, RunData, RunReason, RunStatus};
pub use task::TaskRecord;
pub use task_result::{RepositoryOutcome, RunCompletion, TaskResult, TaskResultState};
