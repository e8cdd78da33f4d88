//! Turns webhook deliveries and cron schedules into scheduled runs.

use crate::run::{
    domain::{NewRun, RunId, RunReason, TaskName},
    ports::RunLedger,
    services::{SchedulingError, SchedulingService},
};
use crate::trigger::{
    domain::WebhookDelivery,
    matcher::{MatcherUnavailable, TriggerCompileError, TriggerMatcher},
};
use chrono::Duration;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Errors raised while enqueueing triggered runs.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The matcher thread has stopped.
    #[error(transparent)]
    MatcherUnavailable(#[from] MatcherUnavailable),

    /// Some matched tasks could not be scheduled.
    #[error("{} triggered run(s) could not be scheduled", failures.len())]
    Scheduling {
        /// Runs that were scheduled.
        scheduled: Vec<RunId>,
        /// Tasks whose run could not be scheduled, with the cause.
        failures: Vec<(TaskName, SchedulingError)>,
    },
}

/// Trigger engine.
///
/// Webhook matches and cron ticks both become runs through
/// [`SchedulingService::enqueue`], so input validation and coalescing apply
/// uniformly.
pub struct TriggerEngine<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    matcher: TriggerMatcher,
    scheduling: Arc<SchedulingService<L, C>>,
    clock: Arc<C>,
    deliveries: TaskTracker,
}

impl<L, C> TriggerEngine<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    /// Creates an engine from an already compiled matcher.
    #[must_use]
    pub fn new(matcher: TriggerMatcher, scheduling: Arc<SchedulingService<L, C>>, clock: Arc<C>) -> Self {
        Self {
            matcher,
            scheduling,
            clock,
            deliveries: TaskTracker::new(),
        }
    }

    /// Compiles the triggers of the scheduling service's catalog.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerCompileError`] when any trigger expression is
    /// invalid.
    pub fn compile(scheduling: Arc<SchedulingService<L, C>>, clock: Arc<C>) -> Result<Self, TriggerCompileError> {
        let matcher = TriggerMatcher::compile(scheduling.catalog())?;
        info!(entries = matcher.len(), "webhook triggers compiled");
        Ok(Self::new(matcher, scheduling, clock))
    }

    /// Schedules a run for every task whose webhook trigger matches.
    ///
    /// Each run is due at the delivery's receive time plus the task's
    /// webhook delay. A failure for one task does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Scheduling`] listing every task that could not
    /// be scheduled, and [`EnqueueError::MatcherUnavailable`] when matching
    /// is impossible.
    pub async fn enqueue(&self, delivery: &WebhookDelivery) -> Result<Vec<RunId>, EnqueueError> {
        let matches = self.matcher.matches(delivery).await?;
        let mut scheduled = Vec::with_capacity(matches.len());
        let mut failures = Vec::new();

        for matched in matches {
            let task = matched.key.task;
            let schedule_after = Duration::from_std(matched.delay)
                .ok()
                .and_then(|delay| delivery.received_at.checked_add_signed(delay))
                .unwrap_or(delivery.received_at);
            let run = NewRun::new(task.clone(), RunReason::Webhook, schedule_after)
                .with_run_data(matched.run_data);
            match self.scheduling.enqueue(run).await {
                Ok(id) => {
                    info!(
                        run_id = %id,
                        task = %task,
                        provider = %delivery.provider,
                        event = %delivery.event,
                        delivery = delivery.delivery_id.as_deref().unwrap_or_default(),
                        "webhook run scheduled"
                    );
                    scheduled.push(id);
                }
                Err(err) => {
                    warn!(task = %task, provider = %delivery.provider, error = %err, "webhook run rejected");
                    failures.push((task, err));
                }
            }
        }

        if failures.is_empty() {
            Ok(scheduled)
        } else {
            Err(EnqueueError::Scheduling { scheduled, failures })
        }
    }

    /// Ensures every active cron task has a run queued for its next tick.
    ///
    /// An already pending cron run coalesces with the new one.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Scheduling`] listing every task that could not
    /// be scheduled.
    pub async fn schedule_cron_runs(&self) -> Result<Vec<RunId>, EnqueueError> {
        let now = self.clock.utc();
        let mut scheduled = Vec::new();
        let mut failures = Vec::new();

        let due: Vec<NewRun> = self
            .scheduling
            .catalog()
            .iter()
            .filter(|definition| definition.is_active())
            .filter_map(|definition| {
                let next_tick = definition.trigger().cron.as_ref()?.next_after(now)?;
                Some(NewRun::new(definition.name().clone(), RunReason::Cron, next_tick))
            })
            .collect();

        for run in due {
            let task = run.task_name().clone();
            match self.scheduling.enqueue(run).await {
                Ok(id) => scheduled.push(id),
                Err(err) => {
                    warn!(task = %task, error = %err, "cron run rejected");
                    failures.push((task, err));
                }
            }
        }

        if failures.is_empty() {
            Ok(scheduled)
        } else {
            Err(EnqueueError::Scheduling { scheduled, failures })
        }
    }
}

impl<L, C> TriggerEngine<L, C>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Enqueues `delivery` on a tracked background task and returns at once.
    ///
    /// Scheduling failures are logged. [`Self::settle_deliveries`] waits for
    /// every dispatched delivery.
    pub fn dispatch(self: &Arc<Self>, delivery: WebhookDelivery) {
        let engine = Arc::clone(self);
        self.deliveries.spawn(async move {
            match engine.enqueue(&delivery).await {
                Ok(_) => {}
                Err(EnqueueError::Scheduling { failures, .. }) => {
                    for (task, err) in failures {
                        warn!(
                            task = %task,
                            provider = %delivery.provider,
                            delivery = delivery.delivery_id.as_deref().unwrap_or_default(),
                            error = %err,
                            "webhook run could not be scheduled"
                        );
                    }
                }
                Err(err) => error!(provider = %delivery.provider, error = %err, "webhook not processed"),
            }
        });
    }

    /// Waits until every dispatched delivery has been enqueued.
    pub async fn settle_deliveries(&self) {
        if self.deliveries.close() {
            info!(in_flight = self.deliveries.len(), "waiting for webhook deliveries");
        }
        self.deliveries.wait().await;
    }
}
