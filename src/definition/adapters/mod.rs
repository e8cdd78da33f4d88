//! Adapters that produce task definitions.

pub mod file;

pub use file::{load_task_catalog, parse_task_definition};
