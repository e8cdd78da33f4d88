//! Trigger orchestration.

pub mod engine;

pub use engine::{EnqueueError, TriggerEngine};
