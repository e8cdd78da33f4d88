//! A run claimed by one server process is failed when the next one starts.

use super::helpers::{LedgerFile, at, ledger_file};
use eyre::eyre;
use repowright::api::WebhookSecrets;
use repowright::clock::ManualClock;
use repowright::definition::adapters::parse_task_definition;
use repowright::definition::domain::TaskCatalog;
use repowright::run::{
    domain::{PageRequest, RunFilter, RunReason, RunStatus, TaskHash},
    adapters::sqlite::SqliteRunLedger,
    services::{ORPHANED_RUN_MESSAGE, ShutdownSettings},
};
use repowright::server::Server;
use rstest::rstest;
use std::sync::Arc;

fn catalog(hash: &str) -> eyre::Result<TaskCatalog> {
    let definition = parse_task_definition("name = \"deps\"", TaskHash::new(hash))?;
    Ok(TaskCatalog::new([definition])?)
}

async fn boot(
    ledger_file: &LedgerFile,
    hash: &str,
    clock: &Arc<ManualClock>,
) -> eyre::Result<Server<SqliteRunLedger, ManualClock>> {
    let server = Server::bootstrap(
        Arc::new(ledger_file.open()),
        catalog(hash)?,
        Arc::clone(clock),
        WebhookSecrets::default(),
        ShutdownSettings::default(),
    )
    .await?;
    Ok(server)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_fails_runs_left_running(ledger_file: LedgerFile) -> eyre::Result<()> {
    let clock = Arc::new(ManualClock::new(at(12, 0)));
    let first = boot(&ledger_file, "v1", &clock).await?;
    let claimed = first
        .scheduling()
        .get_work()
        .await?
        .ok_or_else(|| eyre!("new-task run should be due"))?;
    assert_eq!(claimed.run.reason(), RunReason::New);
    drop(first);

    clock.set(at(12, 10));
    let second = boot(&ledger_file, "v1", &clock).await?;

    let run = second.scheduling().get_run(claimed.run.id()).await?;
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.error(), Some(ORPHANED_RUN_MESSAGE));
    assert_eq!(run.finished_at(), Some(at(12, 10)));

    let pending = second
        .scheduling()
        .list_runs(
            &RunFilter {
                statuses: vec![RunStatus::Pending],
                task_name: None,
            },
            PageRequest::default(),
        )
        .await?;
    assert_eq!(pending.total_items, 0, "unchanged task must not be rescheduled");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn changed_definition_is_rescheduled_after_restart(
    ledger_file: LedgerFile,
) -> eyre::Result<()> {
    let clock = Arc::new(ManualClock::new(at(12, 0)));
    boot(&ledger_file, "v1", &clock).await?;
    let second = boot(&ledger_file, "v2", &clock).await?;

    let listing = second
        .scheduling()
        .list_runs(&RunFilter::default(), PageRequest::default())
        .await?;
    let reasons: Vec<RunReason> = listing.items.iter().map(|run| run.reason()).collect();
    assert!(reasons.contains(&RunReason::New));
    assert!(reasons.contains(&RunReason::Changed));
    Ok(())
}
