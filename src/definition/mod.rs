//! Task definitions as seen by the scheduler.
//!
//! A definition carries the task's name, content hash, declared inputs,
//! trigger block and auto-merge flag. Definitions are loaded from TOML task
//! files by [`adapters::file`]; the rest of a task file (actions, repository
//! filters) belongs to the processor and is not modelled here.

pub mod adapters;
pub mod domain;

#[cfg(test)]
mod tests;
