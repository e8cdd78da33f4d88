//! Work source speaking the scheduling API over HTTP.

use crate::api::wire::{GetWorkResponse, ReportWorkRequest, ReportWorkResponse, ReportedTaskResult};
use crate::run::domain::{RunCompletion, RunId, TaskHash, TaskName};
use crate::worker::{
    domain::WorkItem,
    ports::{WorkSource, WorkSourceError, WorkSourceResult},
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

const WORK_PATH: &str = "/api/v1/worker/work";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the worker endpoints of a repowright server.
#[derive(Debug, Clone)]
pub struct HttpWorkSource {
    client: reqwest::Client,
    work_url: String,
}

impl HttpWorkSource {
    /// Creates a work source for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkSourceError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> WorkSourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(WorkSourceError::transport)?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a work source using an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            work_url: format!("{}{WORK_PATH}", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl WorkSource for HttpWorkSource {
    async fn next_work(&self) -> WorkSourceResult<Option<WorkItem>> {
        let response = self
            .client
            .get(&self.work_url)
            .send()
            .await
            .map_err(WorkSourceError::transport)?;
        let body: GetWorkResponse = decode(response).await?;
        work_item_from(body)
    }

    async fn report(&self, run_id: RunId, completion: RunCompletion) -> WorkSourceResult<()> {
        let request = ReportWorkRequest {
            run_id: run_id.value(),
            error: completion.error,
            task_results: completion
                .outcomes
                .into_iter()
                .map(ReportedTaskResult::from)
                .collect(),
        };
        let response = self
            .client
            .post(&self.work_url)
            .json(&request)
            .send()
            .await
            .map_err(WorkSourceError::transport)?;
        let ack: ReportWorkResponse = decode(response).await?;
        if ack.result == ReportWorkResponse::ok().result {
            Ok(())
        } else {
            Err(WorkSourceError::InvalidResponse(format!(
                "unexpected report acknowledgement: {}",
                ack.result
            )))
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> WorkSourceResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WorkSourceError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| WorkSourceError::InvalidResponse(err.to_string()))
}

/// Converts a claim response into a work item; run ID 0 means no work.
///
/// # Errors
///
/// Returns [`WorkSourceError::InvalidResponse`] when a claimed run carries no
/// usable task.
pub fn work_item_from(response: GetWorkResponse) -> WorkSourceResult<Option<WorkItem>> {
    if response.run_id == 0 {
        return Ok(None);
    }
    let Some(task) = response.task else {
        return Err(WorkSourceError::InvalidResponse(format!(
            "run {} has no task",
            response.run_id
        )));
    };
    let task_name =
        TaskName::new(task.name).map_err(|err| WorkSourceError::InvalidResponse(err.to_string()))?;
    Ok(Some(WorkItem {
        run_id: RunId::new(response.run_id),
        task_name,
        task_hash: TaskHash::new(task.hash),
        repositories: response.repositories,
        run_data: response.run_data,
    }))
}
