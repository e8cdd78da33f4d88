//! Worker orchestration.

pub mod execution_loop;

pub use execution_loop::{Worker, WorkerHandle, WorkerSettings};
