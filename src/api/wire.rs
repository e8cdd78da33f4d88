//! JSON bodies of the scheduling API.
//!
//! Shared by the axum handlers and the worker's HTTP work source so both
//! sides agree on field names.

use crate::run::domain::{
    Page, RepositoryOutcome, Run, RunCompletion, RunData, RunReason, RunStatus, TaskResult,
    TaskResultState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task identity attached to claimed work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkTask {
    /// Task name.
    pub name: String,
    /// Hash of the definition the server holds.
    pub hash: String,
}

/// Response of `GET /api/v1/worker/work`; `run_id == 0` means no work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetWorkResponse {
    /// Claimed run, or 0.
    #[serde(rename = "runID")]
    pub run_id: i64,
    /// Task to execute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<WorkTask>,
    /// Repositories to restrict execution to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
    /// Run data.
    #[serde(default, skip_serializing_if = "RunData::is_empty")]
    pub run_data: RunData,
}

/// One repository outcome in a work report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedTaskResult {
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Repository-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pull request state.
    pub status: TaskResultState,
    /// Pull request URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
}

impl From<RepositoryOutcome> for ReportedTaskResult {
    fn from(outcome: RepositoryOutcome) -> Self {
        Self {
            repository_name: outcome.repository_name,
            result: outcome.result,
            error: outcome.error,
            status: outcome.state,
            pull_request_url: outcome.pull_request_url,
        }
    }
}

impl From<ReportedTaskResult> for RepositoryOutcome {
    fn from(reported: ReportedTaskResult) -> Self {
        Self {
            repository_name: reported.repository_name,
            result: reported.result,
            state: reported.status,
            pull_request_url: reported.pull_request_url,
            error: reported.error,
        }
    }
}

/// Body of `POST /api/v1/worker/work`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWorkRequest {
    /// Reported run.
    #[serde(rename = "runID")]
    pub run_id: i64,
    /// Top-level execution error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-repository outcomes.
    #[serde(default)]
    pub task_results: Vec<ReportedTaskResult>,
}

impl ReportWorkRequest {
    /// Splits the request into the run ID and its completion.
    #[must_use]
    pub fn into_completion(self) -> (i64, RunCompletion) {
        let completion = RunCompletion {
            error: self.error,
            outcomes: self.task_results.into_iter().map(RepositoryOutcome::from).collect(),
        };
        (self.run_id, completion)
    }
}

/// Response of `POST /api/v1/worker/work`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWorkResponse {
    /// Always `ok`.
    pub result: String,
}

impl ReportWorkResponse {
    /// The acknowledgement body.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            result: "ok".to_owned(),
        }
    }
}

/// Body of `POST /api/v1/runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRunBody {
    /// Task to run.
    pub task_name: String,
    /// Run data.
    #[serde(default)]
    pub run_data: RunData,
    /// Repositories to restrict the run to.
    #[serde(default)]
    pub repository_names: Vec<String>,
    /// Earliest start; now when absent.
    #[serde(default)]
    pub schedule_after: Option<DateTime<Utc>>,
}

/// Response of `POST /api/v1/runs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRunResponse {
    /// Created or coalesced run.
    #[serde(rename = "runID")]
    pub run_id: i64,
}

/// Pagination block of listing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    /// Previous page number; 0 on the first page.
    pub previous_page: u32,
    /// Current page number.
    pub current_page: u32,
    /// Next page number; 0 on the last page.
    pub next_page: u32,
    /// Page size.
    pub items_per_page: u32,
    /// Items across all pages.
    pub total_items: u64,
    /// Number of pages; 0 when there are no items.
    pub total_pages: u64,
}

impl<T> From<&Page<T>> for PageView {
    fn from(page: &Page<T>) -> Self {
        Self {
            previous_page: page.previous_page(),
            current_page: page.request.page(),
            next_page: page.next_page(),
            items_per_page: page.request.limit(),
            total_items: page.total_items,
            total_pages: page.total_pages(),
        }
    }
}

/// A run as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    /// Run ID.
    pub id: i64,
    /// Task name.
    pub task_name: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Creation reason.
    pub reason: RunReason,
    /// Earliest start.
    pub schedule_after: DateTime<Utc>,
    /// Claim time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Target repositories; empty means all.
    #[serde(default)]
    pub repository_names: Vec<String>,
    /// Run data.
    #[serde(default)]
    pub run_data: RunData,
}

impl From<&Run> for RunView {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id().value(),
            task_name: run.task_name().as_str().to_owned(),
            status: run.status(),
            reason: run.reason(),
            schedule_after: run.schedule_after(),
            started_at: run.started_at(),
            finished_at: run.finished_at(),
            error: run.error().map(str::to_owned),
            repository_names: run.repository_names().to_vec(),
            run_data: run.run_data().clone(),
        }
    }
}

/// Response of `GET /api/v1/runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRunsResponse {
    /// Pagination details.
    pub page: PageView,
    /// Runs on this page.
    pub result: Vec<RunView>,
}

/// Response of `GET /api/v1/runs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRunResponse {
    /// The run.
    pub run: RunView,
}

/// A task result as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultView {
    /// Run the result belongs to.
    #[serde(rename = "runID")]
    pub run_id: i64,
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Pull request state.
    pub status: TaskResultState,
    /// Pull request URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    /// Repository-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time the result was recorded.
    pub created_at: DateTime<Utc>,
}

impl From<&TaskResult> for TaskResultView {
    fn from(result: &TaskResult) -> Self {
        Self {
            run_id: result.run_id.value(),
            repository_name: result.repository_name.clone(),
            result: result.result,
            status: result.state,
            pull_request_url: result.pull_request_url.clone(),
            error: result.error.clone(),
            created_at: result.created_at,
        }
    }
}

/// Response of `GET /api/v1/taskResults`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTaskResultsResponse {
    /// Pagination details.
    pub page: PageView,
    /// Results on this page.
    pub result: Vec<TaskResultView>,
}
