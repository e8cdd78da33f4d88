//! Worker side of repowright.
//!
//! Polls the scheduling API for due runs, executes them through a
//! [`ports::Processor`] with bounded concurrency and reports the outcome.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The execution loop in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
