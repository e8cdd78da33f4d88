//! Graceful drain on shutdown and orphan recovery on startup.

use crate::run::ports::RunLedger;
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Failure message for runs left running by a previous server process.
pub const ORPHANED_RUN_MESSAGE: &str =
    "Run was abandoned by a previous server process before it reported";

/// Failure message for runs still running when the drain timed out.
pub const LATE_RUN_MESSAGE: &str = "Run failed to report before shutdown";

/// Switch that stops new claims once shutdown begins.
#[derive(Debug, Default)]
pub struct ClaimGate {
    closed: AtomicBool,
}

impl ClaimGate {
    /// Creates an open gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }

    /// Stops further claims.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once claims have stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Drain timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSettings {
    /// How often the monitor counts running runs.
    pub check_interval: Duration,
    /// Upper bound on the whole drain.
    pub timeout: Duration,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// How a drain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No run was left running.
    Drained,
    /// The timeout elapsed; the listed runs were failed.
    TimedOut {
        /// Runs marked failed because they never reported.
        abandoned: usize,
    },
}

/// Server-side shutdown coordinator.
pub struct ShutdownCoordinator<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    ledger: Arc<L>,
    gate: Arc<ClaimGate>,
    clock: Arc<C>,
    settings: ShutdownSettings,
}

impl<L, C> ShutdownCoordinator<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    /// Creates a coordinator sharing `gate` with the scheduling service.
    #[must_use]
    pub const fn new(
        ledger: Arc<L>,
        gate: Arc<ClaimGate>,
        clock: Arc<C>,
        settings: ShutdownSettings,
    ) -> Self {
        Self {
            ledger,
            gate,
            clock,
            settings,
        }
    }

    /// Fails every run a previous process left running.
    ///
    /// Errors are logged, never returned; startup continues regardless.
    /// Returns the number of recovered runs.
    pub async fn recover_orphaned_runs(&self) -> usize {
        match self
            .ledger
            .fail_running_runs(ORPHANED_RUN_MESSAGE, self.clock.utc())
            .await
        {
            Ok(ids) => {
                if !ids.is_empty() {
                    warn!(count = ids.len(), run_ids = ?ids, "failed runs orphaned by a previous server process");
                }
                ids.len()
            }
            Err(err) => {
                error!(error = %err, "failed to recover orphaned runs");
                0
            }
        }
    }

    /// Stops new claims and waits for running runs to report.
    ///
    /// Polls the ledger every `check_interval` until nothing is running or
    /// `timeout` elapses. On timeout the remaining runs are failed.
    pub async fn drain(&self) -> DrainOutcome {
        self.gate.close();
        info!("shutdown started, no new runs will be handed out");

        if tokio::time::timeout(self.settings.timeout, self.wait_for_idle())
            .await
            .is_ok()
        {
            info!("all runs reported, shutdown can proceed");
            return DrainOutcome::Drained;
        }

        error!(timeout = ?self.settings.timeout, "runs did not report before the shutdown timeout");
        let abandoned = match self
            .ledger
            .fail_running_runs(LATE_RUN_MESSAGE, self.clock.utc())
            .await
        {
            Ok(ids) => ids.len(),
            Err(err) => {
                error!(error = %err, "failed to mark late runs as failed");
                0
            }
        };
        DrainOutcome::TimedOut { abandoned }
    }

    async fn wait_for_idle(&self) {
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        loop {
            ticker.tick().await;
            match self.ledger.count_running().await {
                Ok(0) => return,
                Ok(running) => info!(running, "waiting for runs to report"),
                Err(err) => warn!(error = %err, "failed to count running runs"),
            }
        }
    }
}
