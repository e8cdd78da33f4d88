//! Run submission and ledger inspection endpoints.

use super::ApiState;
use super::error::ApiError;
use super::wire::{
    GetRunResponse, ListRunsResponse, ListTaskResultsResponse, PageView, RunView,
    ScheduleRunBody, ScheduleRunResponse, TaskResultView,
};
use crate::run::{
    domain::{PageRequest, RunFilter, RunId, RunStatus, TaskName, TaskResultFilter, TaskResultState},
    ports::RunLedger,
    services::ScheduleRunRequest,
};
use axum::Json;
use axum::extract::{Path, Query, State};
use mockable::Clock;
use serde::Deserialize;

/// Query of `GET /api/v1/runs`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ListRunsQuery {
    status: Option<String>,
    task: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// Query of `GET /api/v1/taskResults`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListTaskResultsQuery {
    run_id: Option<i64>,
    repository_name: Option<String>,
    status: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

fn page_request(page: Option<u32>, limit: Option<u32>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), limit.unwrap_or(PageRequest::DEFAULT_LIMIT))
}

/// Parses a comma-separated list, ignoring blank items.
fn parse_list<T, E>(raw: Option<&str>, parse: impl Fn(&str) -> Result<T, E>) -> Result<Vec<T>, ApiError>
where
    E: std::fmt::Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse(item).map_err(|err| ApiError::BadRequest(err.to_string())))
        .collect()
}

/// `POST /api/v1/runs`
pub(super) async fn schedule_run<L, C>(
    State(state): State<ApiState<L, C>>,
    Json(body): Json<ScheduleRunBody>,
) -> Result<Json<ScheduleRunResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let mut request = ScheduleRunRequest::new(body.task_name)
        .with_run_data(body.run_data)
        .with_repository_names(body.repository_names);
    if let Some(schedule_after) = body.schedule_after {
        request = request.with_schedule_after(schedule_after);
    }
    let run_id = state.scheduling.schedule_run(request).await?;
    Ok(Json(ScheduleRunResponse {
        run_id: run_id.value(),
    }))
}

/// `GET /api/v1/runs`
pub(super) async fn list_runs<L, C>(
    State(state): State<ApiState<L, C>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ListRunsResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let filter = RunFilter {
        statuses: parse_list(query.status.as_deref(), |item| RunStatus::try_from(item))?,
        task_name: query
            .task
            .filter(|name| !name.trim().is_empty())
            .map(TaskName::new)
            .transpose()
            .map_err(|err| ApiError::BadRequest(err.to_string()))?,
    };
    let page = state
        .scheduling
        .list_runs(&filter, page_request(query.page, query.limit))
        .await?;
    Ok(Json(ListRunsResponse {
        page: PageView::from(&page),
        result: page.items.iter().map(RunView::from).collect(),
    }))
}

/// `GET /api/v1/runs/{run_id}`
pub(super) async fn get_run<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(run_id): Path<i64>,
) -> Result<Json<GetRunResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let run = state.scheduling.get_run(RunId::new(run_id)).await?;
    Ok(Json(GetRunResponse {
        run: RunView::from(&run),
    }))
}

/// `DELETE /api/v1/runs/{run_id}`
pub(super) async fn delete_run<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(run_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    state.scheduling.delete_run(RunId::new(run_id)).await?;
    Ok(Json(serde_json::json!({})))
}

/// `GET /api/v1/taskResults`
pub(super) async fn list_task_results<L, C>(
    State(state): State<ApiState<L, C>>,
    Query(query): Query<ListTaskResultsQuery>,
) -> Result<Json<ListTaskResultsResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let filter = TaskResultFilter {
        run_id: query.run_id.map(RunId::new),
        repository_name: query.repository_name.filter(|name| !name.is_empty()),
        states: parse_list(query.status.as_deref(), |item| TaskResultState::try_from(item))?,
    };
    let page = state
        .scheduling
        .list_task_results(&filter, page_request(query.page, query.limit))
        .await?;
    Ok(Json(ListTaskResultsResponse {
        page: PageView::from(&page),
        result: page.items.iter().map(TaskResultView::from).collect(),
    }))
}
