//! Adapter implementations for the run ledger port.

pub mod memory;
pub mod sqlite;
