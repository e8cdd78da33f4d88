//! `SQLite` ledger integration tests.
//!
//! Tests are organized into modules by functionality:
//! - `ledger_tests`: Claim ordering, coalescing, completion and listings
//! - `recovery_tests`: Orphaned runs across server restarts on one file

mod sqlite {
    pub mod helpers;

    mod ledger_tests;
    mod recovery_tests;
}
