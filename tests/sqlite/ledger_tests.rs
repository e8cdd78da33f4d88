//! Ledger contract checks against a real database file.

use super::helpers::{LedgerFile, at, ledger_file, manual, task_name};
use repowright::run::{
    domain::{
        NewRun, PageRequest, RepositoryOutcome, RunCompletion, RunData, RunFilter, RunReason,
        RunStatus, TaskHash, TaskRecord, TaskResultFilter, TaskResultState,
    },
    ports::{RunLedger, RunLedgerError},
};
use rstest::rstest;
use std::collections::BTreeSet;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claims_follow_schedule_then_id(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    let late = ledger.schedule_run(manual("a", 12, 30)).await.expect("schedule");
    let tie_first = ledger.schedule_run(manual("b", 12, 0)).await.expect("schedule");
    let tie_second = ledger.schedule_run(manual("c", 12, 0)).await.expect("schedule");
    ledger.schedule_run(manual("d", 18, 0)).await.expect("schedule");

    let mut order = Vec::new();
    while let Some(run) = ledger.claim_next(at(13, 0)).await.expect("claim") {
        order.push(run.id());
    }

    assert_eq!(order, vec![tie_first, tie_second, late]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_never_share_a_run(ledger_file: LedgerFile) {
    let ledger = Arc::new(ledger_file.open());
    for index in 0..8 {
        ledger
            .schedule_run(manual(&format!("task-{index}"), 12, 0))
            .await
            .expect("schedule");
    }

    let claims: Vec<_> = (0..16)
        .map(|_| {
            let claimer = Arc::clone(&ledger);
            tokio::spawn(async move { claimer.claim_next(at(12, 0)).await })
        })
        .collect();
    let mut claimed = Vec::new();
    for handle in claims {
        if let Some(run) = handle.await.expect("claim task").expect("claim") {
            claimed.push(run.id());
        }
    }

    let unique: BTreeSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 8);
    assert_eq!(unique.len(), 8);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_runs_coalesce_on_identity(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    let mut data = RunData::new();
    data.insert("sha".to_owned(), "abc".to_owned());
    let webhook = |hour| {
        NewRun::new(task_name("deploy"), RunReason::Webhook, at(hour, 0)).with_run_data(data.clone())
    };

    let first = ledger.schedule_run(webhook(12)).await.expect("schedule");
    let second = ledger.schedule_run(webhook(14)).await.expect("schedule");
    let other = ledger
        .schedule_run(NewRun::new(task_name("deploy"), RunReason::Webhook, at(12, 0)))
        .await
        .expect("schedule");

    assert_eq!(first, second);
    assert_ne!(first, other);
    let moved = ledger.find_run(first).await.expect("find").expect("exists");
    assert_eq!(moved.schedule_after(), at(14, 0));
    assert_eq!(moved.run_data(), &data);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completion_persists_results_and_rejects_second_report(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    let id = ledger.schedule_run(manual("a", 12, 0)).await.expect("schedule");
    ledger.claim_next(at(12, 0)).await.expect("claim");
    let completion = RunCompletion::succeeded(vec![
        RepositoryOutcome::new("acme/api", 1, TaskResultState::Open)
            .with_pull_request_url("https://example.test/acme/api/pull/1"),
    ]);

    let run = ledger.complete_run(id, completion, at(12, 3)).await.expect("complete");
    let second = ledger
        .complete_run(id, RunCompletion::failed("late"), at(12, 4))
        .await;
    let results = ledger
        .list_task_results(
            &TaskResultFilter {
                repository_name: Some("acme/api".to_owned()),
                ..TaskResultFilter::default()
            },
            PageRequest::default(),
        )
        .await
        .expect("list results");

    assert_eq!(run.status(), RunStatus::Finished);
    assert_eq!(run.finished_at(), Some(at(12, 3)));
    assert!(matches!(second, Err(RunLedgerError::RunNotRunning { .. })));
    let stored = results.items.first().expect("one stored result");
    assert_eq!(results.total_items, 1);
    assert_eq!(stored.run_id, id);
    assert_eq!(stored.state, TaskResultState::Open);
    assert_eq!(stored.created_at, at(12, 3));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_records_round_trip_through_updates(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    let record = TaskRecord::new(task_name("a"), TaskHash::new("v1"));
    ledger.insert_task(&record, None).await.expect("insert");

    let changed = NewRun::new(task_name("a"), RunReason::Changed, at(12, 0));
    let deactivated = TaskRecord::new(task_name("a"), TaskHash::new("v2")).with_active(false);
    let scheduled = ledger
        .update_task(&deactivated, Some(changed))
        .await
        .expect("update");
    let duplicate = ledger.insert_task(&record, None).await;

    let stored = ledger
        .find_task(&task_name("a"))
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored, deactivated);
    assert!(scheduled.is_some());
    assert!(matches!(duplicate, Err(RunLedgerError::DuplicateTask(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listings_filter_and_page(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    for minute in 0..3 {
        let repository = vec![format!("acme/repo-{minute}")];
        ledger
            .schedule_run(manual("a", 12, minute).with_repository_names(repository.clone()))
            .await
            .expect("schedule");
        ledger
            .schedule_run(manual("b", 12, minute).with_repository_names(repository))
            .await
            .expect("schedule");
    }

    let page = ledger
        .list_runs(
            &RunFilter {
                statuses: vec![RunStatus::Pending],
                task_name: Some(task_name("a")),
            },
            PageRequest::new(1, 2),
        )
        .await
        .expect("list");

    assert_eq!(page.total_items, 3);
    assert_eq!(page.total_pages(), 2);
    let times: Vec<_> = page.items.iter().map(|run| run.schedule_after()).collect();
    assert_eq!(times, vec![at(12, 2), at(12, 1)]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deleting_a_run_drops_its_results(ledger_file: LedgerFile) {
    let ledger = ledger_file.open();
    let id = ledger.schedule_run(manual("a", 12, 0)).await.expect("schedule");
    ledger.claim_next(at(12, 0)).await.expect("claim");
    ledger
        .complete_run(
            id,
            RunCompletion::succeeded(vec![RepositoryOutcome::new(
                "acme/api",
                2,
                TaskResultState::Merged,
            )]),
            at(12, 1),
        )
        .await
        .expect("complete");

    ledger.delete_run(id).await.expect("delete");

    let results = ledger
        .list_task_results(&TaskResultFilter::default(), PageRequest::default())
        .await
        .expect("list results");
    assert_eq!(ledger.find_run(id).await.expect("find"), None);
    assert_eq!(results.total_items, 0);
}
