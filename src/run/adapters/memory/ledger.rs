//! In-memory run ledger for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::run::{
    domain::{
        NewRun, Page, PageRequest, Run, RunCompletion, RunFilter, RunId, RunStatus,
        TaskName, TaskRecord, TaskResult, TaskResultFilter,
    },
    ports::{RunLedger, RunLedgerError, RunLedgerResult},
};

/// Thread-safe in-memory run ledger.
///
/// A single lock guards all tables, so every operation is atomic with
/// respect to every other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunLedger {
    state: Arc<RwLock<InMemoryLedgerState>>,
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    tasks: HashMap<TaskName, TaskRecord>,
    runs: BTreeMap<RunId, Run>,
    results: Vec<TaskResult>,
    last_run_id: i64,
    last_result_id: i64,
}

impl InMemoryRunLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RunLedgerResult<RwLockReadGuard<'_, InMemoryLedgerState>> {
        self.state
            .read()
            .map_err(|err| RunLedgerError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> RunLedgerResult<RwLockWriteGuard<'_, InMemoryLedgerState>> {
        self.state
            .write()
            .map_err(|err| RunLedgerError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl InMemoryLedgerState {
    fn schedule(&mut self, request: NewRun) -> RunId {
        if let Some(existing) = self
            .runs
            .values_mut()
            .find(|run| request.coalesces_with(run))
        {
            existing.reschedule(request.schedule_after());
            return existing.id();
        }

        self.last_run_id += 1;
        let id = RunId::new(self.last_run_id);
        self.runs.insert(id, Run::pending(id, request));
        id
    }
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    Page {
        items: items.iter().skip(offset).take(limit).cloned().collect(),
        request: page,
        total_items: items.len() as u64,
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn find_task(&self, name: &TaskName) -> RunLedgerResult<Option<TaskRecord>> {
        Ok(self.read()?.tasks.get(name).cloned())
    }

    async fn insert_task(
        &self,
        task: &TaskRecord,
        initial_run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>> {
        let mut state = self.write()?;
        if state.tasks.contains_key(task.name()) {
            return Err(RunLedgerError::DuplicateTask(task.name().clone()));
        }
        state.tasks.insert(task.name().clone(), task.clone());
        Ok(initial_run.map(|run| state.schedule(run)))
    }

    async fn update_task(
        &self,
        task: &TaskRecord,
        run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>> {
        let mut state = self.write()?;
        let record = state
            .tasks
            .get_mut(task.name())
            .ok_or_else(|| RunLedgerError::TaskNotFound(task.name().clone()))?;
        record.clone_from(task);
        Ok(run.map(|request| state.schedule(request)))
    }

    async fn schedule_run(&self, run: NewRun) -> RunLedgerResult<RunId> {
        Ok(self.write()?.schedule(run))
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> RunLedgerResult<Option<Run>> {
        let mut state = self.write()?;
        let candidate = state
            .runs
            .values_mut()
            .filter(|run| run.is_claimable_at(now))
            .min_by_key(|run| (run.schedule_after(), run.id()));
        let Some(run) = candidate else {
            return Ok(None);
        };
        run.claim(now)?;
        Ok(Some(run.clone()))
    }

    async fn complete_run(
        &self,
        id: RunId,
        completion: RunCompletion,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Run> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        let run = state
            .runs
            .get_mut(&id)
            .ok_or(RunLedgerError::RunNotFound(id))?;
        if run.status() != RunStatus::Running {
            return Err(RunLedgerError::RunNotRunning {
                id,
                status: run.status(),
            });
        }
        run.complete(completion.error, now)?;
        let completed = run.clone();

        for outcome in completion.outcomes {
            state.last_result_id += 1;
            state.results.push(TaskResult::from_outcome(
                state.last_result_id,
                id,
                outcome,
                now,
            ));
        }
        Ok(completed)
    }

    async fn fail_running_runs(
        &self,
        message: &str,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Vec<RunId>> {
        let mut state = self.write()?;
        let mut failed = Vec::new();
        for run in state
            .runs
            .values_mut()
            .filter(|run| run.status() == RunStatus::Running)
        {
            run.complete(Some(message.to_owned()), now)?;
            failed.push(run.id());
        }
        Ok(failed)
    }

    async fn count_running(&self) -> RunLedgerResult<u64> {
        let state = self.read()?;
        Ok(state
            .runs
            .values()
            .filter(|run| run.status() == RunStatus::Running)
            .count() as u64)
    }

    async fn find_run(&self, id: RunId) -> RunLedgerResult<Option<Run>> {
        Ok(self.read()?.runs.get(&id).cloned())
    }

    async fn list_runs(&self, filter: &RunFilter, page: PageRequest) -> RunLedgerResult<Page<Run>> {
        let state = self.read()?;
        let mut matching: Vec<Run> = state
            .runs
            .values()
            .filter(|run| filter.matches(run.status(), run.task_name()))
            .cloned()
            .collect();
        matching.sort_by_key(|run| std::cmp::Reverse((run.schedule_after(), run.id())));
        Ok(paginate(&matching, page))
    }

    async fn delete_run(&self, id: RunId) -> RunLedgerResult<()> {
        let mut state = self.write()?;
        if state.runs.remove(&id).is_none() {
            return Err(RunLedgerError::RunNotFound(id));
        }
        state.results.retain(|result| result.run_id != id);
        Ok(())
    }

    async fn list_task_results(
        &self,
        filter: &TaskResultFilter,
        page: PageRequest,
    ) -> RunLedgerResult<Page<TaskResult>> {
        let state = self.read()?;
        let matching: Vec<TaskResult> = state
            .results
            .iter()
            .rev()
            .filter(|result| filter.matches(result.run_id, &result.repository_name, result.state))
            .cloned()
            .collect();
        Ok(paginate(&matching, page))
    }
}
