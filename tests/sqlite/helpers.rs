//! Shared helpers for `SQLite` ledger tests.

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeZone, Utc};
use repowright::run::{
    adapters::sqlite::SqliteRunLedger,
    domain::{NewRun, RunReason, TaskName},
};
use rstest::fixture;
use tempfile::TempDir;

/// A ledger database file that lives as long as the value.
pub struct LedgerFile {
    /// Keeps the directory alive.
    pub dir: TempDir,
    /// Path of the database file.
    pub path: Utf8PathBuf,
}

impl LedgerFile {
    /// Opens a new handle on the database file.
    pub fn open(&self) -> SqliteRunLedger {
        SqliteRunLedger::open(&self.path).expect("ledger database opens")
    }
}

/// Provides a fresh database file in a temporary directory.
#[fixture]
pub fn ledger_file() -> LedgerFile {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("ledger.db")).expect("utf-8 temp path");
    LedgerFile { dir, path }
}

/// Returns a fixed instant on the test day.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

/// Builds a validated task name.
pub fn task_name(name: &str) -> TaskName {
    TaskName::new(name).expect("valid task name")
}

/// A manual run request for `task` due at `hour:minute`.
pub fn manual(task: &str, hour: u32, minute: u32) -> NewRun {
    NewRun::new(task_name(task), RunReason::Manual, at(hour, minute))
}
