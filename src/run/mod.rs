//! Run ledger and scheduling for repowright.
//!
//! Tracks every task run from creation to completion: the ledger records,
//! the claim/report protocol workers speak, startup sync of task
//! definitions, and the drain/recovery pair that keeps runs from being lost
//! when the server stops. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
