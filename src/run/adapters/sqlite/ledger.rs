//! `SQLite` implementation of the run ledger.

use super::{
    connection::{
        LedgerPool, encode_repository_names, encode_run_data, open_pool, row_to_run,
        row_to_task_result, to_micros,
    },
    models::{LastInsertRowId, NewRunRow, NewTaskResultRow, NewTaskRow, RunRow, TaskResultRow, TaskRow},
    schema::{runs, task_results, tasks},
};
use crate::run::{
    domain::{
        NewRun, Page, PageRequest, Run, RunCompletion, RunFilter, RunId, RunStatus, TaskHash,
        TaskName, TaskRecord, TaskResult, TaskResultFilter,
    },
    ports::{RunLedger, RunLedgerError, RunLedgerResult},
};
use async_trait::async_trait;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};

/// `SQLite`-backed run ledger.
///
/// Writes that read before they update run inside `BEGIN IMMEDIATE`
/// transactions, so two processes sharing one database file never claim the
/// same run.
#[derive(Debug, Clone)]
pub struct SqliteRunLedger {
    pool: LedgerPool,
}

impl SqliteRunLedger {
    /// Creates a ledger from an existing pool whose schema is in place.
    #[must_use]
    pub const fn new(pool: LedgerPool) -> Self {
        Self { pool }
    }

    /// Opens the ledger database at `path`, creating and migrating it when
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`RunLedgerError::Persistence`] when the database cannot be
    /// opened or migrated.
    pub fn open(path: &Utf8Path) -> RunLedgerResult<Self> {
        open_pool(path).map(Self::new)
    }

    async fn run_blocking<F, T>(&self, f: F) -> RunLedgerResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> RunLedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(RunLedgerError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(RunLedgerError::persistence)?
    }
}

/// Insert-ready form of a [`NewRun`], encoded before entering the blocking
/// closure.
#[derive(Debug, Clone)]
struct EncodedRun {
    row: NewRunRow,
}

impl EncodedRun {
    fn encode(run: &NewRun) -> RunLedgerResult<Self> {
        Ok(Self {
            row: NewRunRow {
                task_name: run.task_name().as_str().to_owned(),
                status: RunStatus::Pending.as_str().to_owned(),
                reason: run.reason().as_str().to_owned(),
                schedule_after: to_micros(run.schedule_after()),
                repository_names: encode_repository_names(run.repository_names())?,
                run_data: encode_run_data(run.run_data())?,
            },
        })
    }

    /// Inserts the run, or reschedules an identical pending run.
    fn schedule(&self, conn: &mut SqliteConnection) -> RunLedgerResult<RunId> {
        let row = &self.row;
        let existing = runs::table
            .filter(runs::status.eq(RunStatus::Pending.as_str()))
            .filter(runs::task_name.eq(&row.task_name))
            .filter(runs::reason.eq(&row.reason))
            .filter(runs::repository_names.eq(&row.repository_names))
            .filter(runs::run_data.eq(&row.run_data))
            .order(runs::id.asc())
            .select((runs::id, runs::schedule_after))
            .first::<(i64, i64)>(conn)
            .optional()?;

        if let Some((id, schedule_after)) = existing {
            if schedule_after != row.schedule_after {
                diesel::update(runs::table.filter(runs::id.eq(id)))
                    .set(runs::schedule_after.eq(row.schedule_after))
                    .execute(conn)?;
            }
            return Ok(RunId::new(id));
        }

        diesel::insert_into(runs::table)
            .values(row)
            .execute(conn)?;
        last_insert_rowid(conn).map(RunId::new)
    }
}

fn encode_optional(run: Option<&NewRun>) -> RunLedgerResult<Option<EncodedRun>> {
    run.map(EncodedRun::encode).transpose()
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> RunLedgerResult<i64> {
    let row = diesel::sql_query("SELECT last_insert_rowid() AS id")
        .get_result::<LastInsertRowId>(conn)?;
    Ok(row.id)
}

fn load_run(conn: &mut SqliteConnection, id: i64) -> RunLedgerResult<Option<RunRow>> {
    Ok(runs::table
        .filter(runs::id.eq(id))
        .select(RunRow::as_select())
        .first::<RunRow>(conn)
        .optional()?)
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
    (offset, i64::from(page.limit()))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl RunLedger for SqliteRunLedger {
    async fn find_task(&self, name: &TaskName) -> RunLedgerResult<Option<TaskRecord>> {
        let lookup = name.clone();
        let row = self
            .run_blocking(move |conn| {
                Ok(tasks::table
                    .filter(tasks::name.eq(lookup.as_str()))
                    .select(TaskRow::as_select())
                    .first::<TaskRow>(conn)
                    .optional()?)
            })
            .await?;

        row.map(|found| {
            Ok(TaskRecord::from_persisted(
                TaskName::new(found.name)?,
                TaskHash::new(found.hash),
                found.active,
            ))
        })
        .transpose()
    }

    async fn insert_task(
        &self,
        task: &TaskRecord,
        initial_run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>> {
        let name = task.name().clone();
        let new_row = NewTaskRow {
            name: task.name().as_str().to_owned(),
            hash: task.hash().as_str().to_owned(),
            active: task.is_active(),
        };
        let encoded = encode_optional(initial_run.as_ref())?;

        self.run_blocking(move |conn| {
            conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                diesel::insert_into(tasks::table)
                    .values(&new_row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            RunLedgerError::DuplicateTask(name.clone())
                        }
                        _ => RunLedgerError::persistence(err),
                    })?;
                encoded.as_ref().map(|run| run.schedule(tx)).transpose()
            })
        })
        .await
    }

    async fn update_task(
        &self,
        task: &TaskRecord,
        run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>> {
        let task_name = task.name().clone();
        let new_hash = task.hash().as_str().to_owned();
        let active = task.is_active();
        let encoded = encode_optional(run.as_ref())?;

        self.run_blocking(move |conn| {
            conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                let updated = diesel::update(tasks::table.filter(tasks::name.eq(task_name.as_str())))
                    .set((tasks::hash.eq(&new_hash), tasks::active.eq(active)))
                    .execute(tx)?;
                if updated == 0 {
                    return Err(RunLedgerError::TaskNotFound(task_name.clone()));
                }
                encoded.as_ref().map(|request| request.schedule(tx)).transpose()
            })
        })
        .await
    }

    async fn schedule_run(&self, run: NewRun) -> RunLedgerResult<RunId> {
        let encoded = EncodedRun::encode(&run)?;
        self.run_blocking(move |conn| conn.immediate_transaction::<_, RunLedgerError, _>(|tx| encoded.schedule(tx)))
            .await
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> RunLedgerResult<Option<Run>> {
        let now_micros = to_micros(now);
        let claimed = self
            .run_blocking(move |conn| {
                conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                    let candidate = runs::table
                        .filter(runs::status.eq(RunStatus::Pending.as_str()))
                        .filter(runs::schedule_after.le(now_micros))
                        .order((runs::schedule_after.asc(), runs::id.asc()))
                        .select(RunRow::as_select())
                        .first::<RunRow>(tx)
                        .optional()?;
                    let Some(row) = candidate else {
                        return Ok(None);
                    };

                    let updated = diesel::update(
                        runs::table
                            .filter(runs::id.eq(row.id))
                            .filter(runs::status.eq(RunStatus::Pending.as_str())),
                    )
                    .set((
                        runs::status.eq(RunStatus::Running.as_str()),
                        runs::started_at.eq(Some(now_micros)),
                    ))
                    .execute(tx)?;
                    if updated == 0 {
                        return Ok(None);
                    }
                    Ok(Some(RunRow {
                        status: RunStatus::Running.as_str().to_owned(),
                        started_at: Some(now_micros),
                        ..row
                    }))
                })
            })
            .await?;

        claimed.map(row_to_run).transpose()
    }

    async fn complete_run(
        &self,
        id: RunId,
        completion: RunCompletion,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Run> {
        let now_micros = to_micros(now);
        let status = if completion.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };
        let error = completion.error;
        let result_rows: Vec<NewTaskResultRow> = completion
            .outcomes
            .into_iter()
            .map(|outcome| NewTaskResultRow {
                run_id: id.value(),
                repository_name: outcome.repository_name,
                result: outcome.result,
                state: outcome.state.as_str().to_owned(),
                pull_request_url: outcome.pull_request_url,
                error: outcome.error,
                created_at: now_micros,
            })
            .collect();

        let row = self
            .run_blocking(move |conn| {
                conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                    let current = load_run(tx, id.value())?.ok_or(RunLedgerError::RunNotFound(id))?;
                    let current_status = RunStatus::try_from(current.status.as_str())
                        .map_err(RunLedgerError::persistence)?;
                    if current_status != RunStatus::Running {
                        return Err(RunLedgerError::RunNotRunning {
                            id,
                            status: current_status,
                        });
                    }

                    diesel::update(
                        runs::table
                            .filter(runs::id.eq(id.value()))
                            .filter(runs::status.eq(RunStatus::Running.as_str())),
                    )
                    .set((
                        runs::status.eq(status.as_str()),
                        runs::finished_at.eq(Some(now_micros)),
                        runs::error.eq(error.as_deref()),
                    ))
                    .execute(tx)?;

                    for result_row in &result_rows {
                        diesel::insert_into(task_results::table)
                            .values(result_row)
                            .execute(tx)?;
                    }

                    load_run(tx, id.value())?.ok_or(RunLedgerError::RunNotFound(id))
                })
            })
            .await?;

        row_to_run(row)
    }

    async fn fail_running_runs(
        &self,
        message: &str,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Vec<RunId>> {
        let now_micros = to_micros(now);
        let error = message.to_owned();
        let ids = self
            .run_blocking(move |conn| {
                conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                    let ids = runs::table
                        .filter(runs::status.eq(RunStatus::Running.as_str()))
                        .order(runs::id.asc())
                        .select(runs::id)
                        .load::<i64>(tx)?;
                    diesel::update(runs::table.filter(runs::id.eq_any(ids.clone())))
                        .set((
                            runs::status.eq(RunStatus::Failed.as_str()),
                            runs::finished_at.eq(Some(now_micros)),
                            runs::error.eq(Some(error.as_str())),
                        ))
                        .execute(tx)?;
                    Ok(ids)
                })
            })
            .await?;
        Ok(ids.into_iter().map(RunId::new).collect())
    }

    async fn count_running(&self) -> RunLedgerResult<u64> {
        let count = self
            .run_blocking(|conn| {
                Ok(runs::table
                    .filter(runs::status.eq(RunStatus::Running.as_str()))
                    .count()
                    .get_result::<i64>(conn)?)
            })
            .await?;
        Ok(to_count(count))
    }

    async fn find_run(&self, id: RunId) -> RunLedgerResult<Option<Run>> {
        let row = self
            .run_blocking(move |conn| load_run(conn, id.value()))
            .await?;
        row.map(row_to_run).transpose()
    }

    async fn list_runs(&self, filter: &RunFilter, page: PageRequest) -> RunLedgerResult<Page<Run>> {
        let statuses: Vec<&'static str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        let task_name = filter.task_name.as_ref().map(|name| name.as_str().to_owned());
        let (offset, limit) = page_bounds(page);

        let (total, rows) = self
            .run_blocking(move |conn| {
                let filtered = || {
                    let mut query = runs::table.into_boxed::<Sqlite>();
                    if !statuses.is_empty() {
                        query = query.filter(runs::status.eq_any(statuses.clone()));
                    }
                    if let Some(name) = &task_name {
                        query = query.filter(runs::task_name.eq(name.clone()));
                    }
                    query
                };

                let total = filtered().count().get_result::<i64>(conn)?;
                let rows = filtered()
                    .order((runs::schedule_after.desc(), runs::id.desc()))
                    .offset(offset)
                    .limit(limit)
                    .select(RunRow::as_select())
                    .load::<RunRow>(conn)?;
                Ok((total, rows))
            })
            .await?;

        Ok(Page {
            items: rows.into_iter().map(row_to_run).collect::<RunLedgerResult<_>>()?,
            request: page,
            total_items: to_count(total),
        })
    }

    async fn delete_run(&self, id: RunId) -> RunLedgerResult<()> {
        self.run_blocking(move |conn| {
            conn.immediate_transaction::<_, RunLedgerError, _>(|tx| {
                diesel::delete(task_results::table.filter(task_results::run_id.eq(id.value())))
                    .execute(tx)?;
                let deleted = diesel::delete(runs::table.filter(runs::id.eq(id.value()))).execute(tx)?;
                if deleted == 0 {
                    return Err(RunLedgerError::RunNotFound(id));
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_task_results(
        &self,
        filter: &TaskResultFilter,
        page: PageRequest,
    ) -> RunLedgerResult<Page<TaskResult>> {
        let run_id = filter.run_id.map(RunId::value);
        let repository_name = filter.repository_name.clone();
        let states: Vec<&'static str> = filter.states.iter().map(|state| state.as_str()).collect();
        let (offset, limit) = page_bounds(page);

        let (total, rows) = self
            .run_blocking(move |conn| {
                let filtered = || {
                    let mut query = task_results::table.into_boxed::<Sqlite>();
                    if let Some(id) = run_id {
                        query = query.filter(task_results::run_id.eq(id));
                    }
                    if let Some(name) = &repository_name {
                        query = query.filter(task_results::repository_name.eq(name.clone()));
                    }
                    if !states.is_empty() {
                        query = query.filter(task_results::state.eq_any(states.clone()));
                    }
                    query
                };

                let total = filtered().count().get_result::<i64>(conn)?;
                let rows = filtered()
                    .order(task_results::id.desc())
                    .offset(offset)
                    .limit(limit)
                    .select(TaskResultRow::as_select())
                    .load::<TaskResultRow>(conn)?;
                Ok((total, rows))
            })
            .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(row_to_task_result)
                .collect::<RunLedgerResult<_>>()?,
            request: page,
            total_items: to_count(total),
        })
    }
}
