//! Connection pool, schema bootstrap and row conversions for the `SQLite`
//! ledger.

use super::models::{RunRow, TaskResultRow};
use crate::run::{
    domain::{
        PersistedRunData, Run, RunData, RunId, RunReason, RunStatus, TaskName, TaskResult,
        TaskResultState,
    },
    ports::{RunLedgerError, RunLedgerResult},
};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;

/// `SQLite` connection pool type used by the ledger.
pub type LedgerPool = Pool<ConnectionManager<SqliteConnection>>;

const SCHEMA_SQL: &str = include_str!("../../../../migrations/2026-01-01-000000_create_ledger/up.sql");

const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

const DEFAULT_POOL_SIZE: u32 = 4;

impl From<DieselError> for RunLedgerError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Opens (creating if needed) the ledger database at `path` and applies the
/// schema.
///
/// # Errors
///
/// Returns [`RunLedgerError::Persistence`] when the pool cannot be built or
/// the schema cannot be applied.
pub fn open_pool(path: &Utf8Path) -> RunLedgerResult<LedgerPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(path.as_str());
    let pool = Pool::builder()
        .max_size(DEFAULT_POOL_SIZE)
        .connection_customizer(Box::new(ConnectionPragmas))
        .build(manager)
        .map_err(RunLedgerError::persistence)?;

    let mut conn = pool.get().map_err(RunLedgerError::persistence)?;
    conn.batch_execute("PRAGMA journal_mode = WAL;")?;
    conn.batch_execute(SCHEMA_SQL)?;
    Ok(pool)
}

/// Converts a timestamp to stored UTC microseconds.
pub(super) fn to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

/// Converts stored UTC microseconds to a timestamp.
pub(super) fn from_micros(value: i64) -> RunLedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value).ok_or_else(|| {
        RunLedgerError::persistence(std::io::Error::other(format!(
            "stored timestamp out of range: {value}"
        )))
    })
}

fn decode_err(err: impl std::fmt::Display) -> RunLedgerError {
    RunLedgerError::persistence(std::io::Error::other(err.to_string()))
}

/// Serialises repository names for storage.
pub(super) fn encode_repository_names(names: &[String]) -> RunLedgerResult<String> {
    serde_json::to_string(names).map_err(RunLedgerError::persistence)
}

/// Serialises run data for storage.
pub(super) fn encode_run_data(data: &RunData) -> RunLedgerResult<String> {
    serde_json::to_string(data).map_err(RunLedgerError::persistence)
}

/// Converts a database row to a domain run.
pub(super) fn row_to_run(row: RunRow) -> RunLedgerResult<Run> {
    let repository_names: Vec<String> =
        serde_json::from_str(&row.repository_names).map_err(decode_err)?;
    let run_data: RunData = serde_json::from_str(&row.run_data).map_err(decode_err)?;

    Ok(Run::from_persisted(PersistedRunData {
        id: RunId::new(row.id),
        task_name: TaskName::new(row.task_name)?,
        status: RunStatus::try_from(row.status.as_str()).map_err(decode_err)?,
        reason: RunReason::try_from(row.reason.as_str()).map_err(decode_err)?,
        schedule_after: from_micros(row.schedule_after)?,
        started_at: row.started_at.map(from_micros).transpose()?,
        finished_at: row.finished_at.map(from_micros).transpose()?,
        error: row.error,
        repository_names,
        run_data,
    }))
}

/// Converts a database row to a domain task result.
pub(super) fn row_to_task_result(row: TaskResultRow) -> RunLedgerResult<TaskResult> {
    Ok(TaskResult {
        id: row.id,
        run_id: RunId::new(row.run_id),
        repository_name: row.repository_name,
        result: row.result,
        state: TaskResultState::try_from(row.state.as_str()).map_err(decode_err)?,
        pull_request_url: row.pull_request_url,
        error: row.error,
        created_at: from_micros(row.created_at)?,
    })
}
