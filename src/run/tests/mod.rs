//! Unit tests for the run ledger context.
//!
//! Covers the run state machine, the in-memory ledger's claim and
//! coalescing rules, and the scheduling, sync and shutdown services.
