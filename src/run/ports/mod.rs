//! Port contracts for the run ledger.

pub mod ledger;

pub use ledger::{RunLedger, RunLedgerError, RunLedgerResult};
