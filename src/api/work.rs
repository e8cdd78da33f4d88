//! Worker endpoints: claim and report.

use super::ApiState;
use super::error::ApiError;
use super::wire::{GetWorkResponse, ReportWorkRequest, ReportWorkResponse, WorkTask};
use crate::run::{domain::RunId, ports::RunLedger};
use axum::Json;
use axum::extract::State;
use mockable::Clock;

/// `GET /api/v1/worker/work`
pub(super) async fn get_work<L, C>(State(state): State<ApiState<L, C>>) -> Result<Json<GetWorkResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let response = match state.scheduling.get_work().await? {
        Some(assignment) => GetWorkResponse {
            run_id: assignment.run.id().value(),
            task: Some(WorkTask {
                name: assignment.run.task_name().as_str().to_owned(),
                hash: assignment.task_hash.as_str().to_owned(),
            }),
            repositories: assignment.run.repository_names().to_vec(),
            run_data: assignment.run.run_data().clone(),
        },
        None => GetWorkResponse::default(),
    };
    Ok(Json(response))
}

/// `POST /api/v1/worker/work`
pub(super) async fn report_work<L, C>(
    State(state): State<ApiState<L, C>>,
    Json(body): Json<ReportWorkRequest>,
) -> Result<Json<ReportWorkResponse>, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let (run_id, completion) = body.into_completion();
    state.scheduling.report_work(RunId::new(run_id), completion).await?;
    Ok(Json(ReportWorkResponse::ok()))
}
