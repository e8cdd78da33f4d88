//! `SQLite` adapters for run ledger persistence.

mod connection;
mod ledger;
mod models;
mod schema;

pub use connection::{LedgerPool, open_pool};
pub use ledger::SqliteRunLedger;
