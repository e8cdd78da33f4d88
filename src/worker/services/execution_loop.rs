//! Bounded-concurrency worker loop.
//!
//! One coordinating task owns the in-flight counter and the stop flag. It
//! polls for work, spawns one task per claimed run and reports results in
//! the order they arrive. Running executions are never cancelled; stopping
//! only closes admissions and waits for the counter to reach zero.

use crate::worker::{
    domain::{ExecutionResult, WorkItem},
    ports::{Processor, WorkSource},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Tunables of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Maximum number of runs executing at once.
    pub parallel_executions: usize,
    /// Interval between work requests.
    pub poll_interval: Duration,
    /// Interval between progress messages while draining.
    pub drain_log_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            parallel_executions: 1,
            poll_interval: Duration::from_secs(1),
            drain_log_interval: Duration::from_secs(10),
        }
    }
}

/// Worker loop ready to be started.
pub struct Worker<S, P>
where
    S: WorkSource + 'static,
    P: Processor + 'static,
{
    source: Arc<S>,
    processor: Arc<P>,
    settings: WorkerSettings,
}

/// Handle to a running worker loop.
///
/// Dropping the handle without calling [`Self::stop`] also closes
/// admissions; in-flight runs still finish and get reported.
#[derive(Debug)]
pub struct WorkerHandle {
    stop_requests: mpsc::Sender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stops admissions and waits until every in-flight run has been
    /// reported.
    pub async fn stop(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.stop_requests.send(done_tx).await.is_ok() && done_rx.await.is_err() {
            debug!("worker loop ended before acknowledging stop");
        }
        if let Err(err) = self.task.await {
            warn!(error = %err, "worker loop terminated abnormally");
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    execution_counter: usize,
    stopped: bool,
    completion: Option<oneshot::Sender<()>>,
}

impl<S, P> Worker<S, P>
where
    S: WorkSource + 'static,
    P: Processor + 'static,
{
    /// Creates a worker. A zero `parallel_executions` is raised to one.
    #[must_use]
    pub fn new(source: Arc<S>, processor: Arc<P>, settings: WorkerSettings) -> Self {
        Self {
            source,
            processor,
            settings: WorkerSettings {
                parallel_executions: settings.parallel_executions.max(1),
                ..settings
            },
        }
    }

    /// Spawns the coordinating task and returns its handle.
    #[must_use]
    pub fn start(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(stop_rx));
        WorkerHandle {
            stop_requests: stop_tx,
            task,
        }
    }

    async fn run(self, mut stop_requests: mpsc::Receiver<oneshot::Sender<()>>) {
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ExecutionResult>();
        let mut poll = interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = interval(self.settings.drain_log_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state = LoopState::default();

        info!(
            parallel_executions = self.settings.parallel_executions,
            "worker started"
        );
        loop {
            tokio::select! {
                _ = poll.tick(), if !state.stopped => {
                    self.admit(&mut state, &result_tx).await;
                }
                Some(result) = result_rx.recv() => {
                    state.execution_counter = state.execution_counter.saturating_sub(1);
                    self.complete(result).await;
                }
                request = stop_requests.recv(), if !state.stopped => {
                    state.stopped = true;
                    state.completion = request;
                    progress.reset();
                    info!(in_flight = state.execution_counter, "worker stopping");
                }
                _ = progress.tick(), if state.stopped => {
                    info!(in_flight = state.execution_counter, "waiting for executions to finish");
                }
            }

            if state.stopped && state.execution_counter == 0 {
                if let Some(done) = state.completion.take() {
                    if done.send(()).is_err() {
                        debug!("stop requester went away");
                    }
                }
                info!("worker stopped");
                break;
            }
        }
    }

    async fn admit(&self, state: &mut LoopState, results: &mpsc::UnboundedSender<ExecutionResult>) {
        if state.execution_counter >= self.settings.parallel_executions {
            return;
        }
        match self.source.next_work().await {
            Ok(Some(item)) => {
                state.execution_counter += 1;
                info!(run_id = %item.run_id, task = %item.task_name, "executing run");
                self.dispatch(item, results.clone());
            }
            Ok(None) => debug!("no work available"),
            Err(err) => warn!(error = %err, "failed to request work"),
        }
    }

    /// Spawns the execution; a panicking processor still yields one result.
    fn dispatch(&self, item: WorkItem, results: mpsc::UnboundedSender<ExecutionResult>) {
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let work = item.clone();
            let execution = tokio::spawn(async move {
                match processor.process(&work).await {
                    Ok(outcomes) => ExecutionResult::succeeded(&work, outcomes),
                    Err(err) => ExecutionResult::failed(&work, err.to_string()),
                }
            });
            let result = match execution.await {
                Ok(result) => result,
                Err(err) => ExecutionResult::failed(&item, format!("execution panicked: {err}")),
            };
            if results.send(result).is_err() {
                warn!(run_id = %item.run_id, "worker loop gone; result dropped");
            }
        });
    }

    async fn complete(&self, result: ExecutionResult) {
        let run_id = result.run_id;
        if let Some(error) = &result.error {
            warn!(run_id = %run_id, task = %result.task_name, %error, "run execution failed");
        } else {
            info!(run_id = %run_id, task = %result.task_name, repositories = result.outcomes.len(), "run executed");
        }
        if let Err(err) = self.source.report(run_id, result.into_completion()).await {
            warn!(run_id = %run_id, error = %err, "failed to report run");
        }
    }
}
