//! Unit tests for task definitions and the task file loader.

mod domain_tests;
