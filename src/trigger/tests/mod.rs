//! Unit tests for webhook matching and the trigger engine.

mod fixtures;
