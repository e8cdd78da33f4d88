//! Repowright: task-run scheduling and worker coordination for repository
//! automation.
//!
//! A server keeps a durable ledger of task runs, turns task-file changes,
//! cron schedules and webhooks into runs, and hands them to workers over a
//! small HTTP claim/report protocol. Workers execute runs with bounded
//! concurrency and report per-repository outcomes.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (`SQLite`, HTTP, processes)
//!
//! # Modules
//!
//! - [`run`]: Run ledger, scheduling, sync and shutdown coordination
//! - [`definition`]: Task definitions and the task file loader
//! - [`trigger`]: Webhook matching and cron scheduling
//! - [`api`]: HTTP interface of the server
//! - [`worker`]: Worker loop, HTTP work source and command processor
//! - [`server`]: Server bootstrap and lifecycle
//! - [`config`]: Server and worker configuration files
//! - [`telemetry`]: Tracing subscriber setup
//! - [`clock`]: Manually driven clock

pub mod api;
pub mod clock;
pub mod config;
pub mod definition;
pub mod run;
pub mod server;
pub mod telemetry;
pub mod trigger;
pub mod worker;
