//! Diesel row models for ledger persistence.

use super::schema::{runs, task_results, tasks};
use diesel::prelude::*;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// Unique task name.
    pub name: String,
    /// Content hash.
    pub hash: String,
    /// Active flag.
    pub active: bool,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Unique task name.
    pub name: String,
    /// Content hash.
    pub hash: String,
    /// Active flag.
    pub active: bool,
}

/// Query result row for runs.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RunRow {
    /// Run identifier.
    pub id: i64,
    /// Task name.
    pub task_name: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation reason.
    pub reason: String,
    /// Earliest claim time, UTC microseconds.
    pub schedule_after: i64,
    /// Claim time, UTC microseconds.
    pub started_at: Option<i64>,
    /// Completion time, UTC microseconds.
    pub finished_at: Option<i64>,
    /// Failure message.
    pub error: Option<String>,
    /// JSON array of repository names.
    pub repository_names: String,
    /// JSON object of run data.
    pub run_data: String,
}

/// Insert model for runs.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = runs)]
pub struct NewRunRow {
    /// Task name.
    pub task_name: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation reason.
    pub reason: String,
    /// Earliest claim time, UTC microseconds.
    pub schedule_after: i64,
    /// JSON array of repository names.
    pub repository_names: String,
    /// JSON object of run data.
    pub run_data: String,
}

/// Query result row for task results.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskResultRow {
    /// Row identifier.
    pub id: i64,
    /// Owning run.
    pub run_id: i64,
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Pull request state.
    pub state: String,
    /// Pull request URL.
    pub pull_request_url: Option<String>,
    /// Repository-level error.
    pub error: Option<String>,
    /// Record time, UTC microseconds.
    pub created_at: i64,
}

/// Insert model for task results.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_results)]
pub struct NewTaskResultRow {
    /// Owning run.
    pub run_id: i64,
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Pull request state.
    pub state: String,
    /// Pull request URL.
    pub pull_request_url: Option<String>,
    /// Repository-level error.
    pub error: Option<String>,
    /// Record time, UTC microseconds.
    pub created_at: i64,
}

/// Result of `SELECT last_insert_rowid()`.
#[derive(Debug, QueryableByName)]
pub struct LastInsertRowId {
    /// Row identifier assigned by the most recent insert.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub id: i64,
}
