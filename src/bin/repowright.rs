//! Command-line entry point.
//!
//! ```text
//! repowright server --config server.toml
//! repowright worker --config worker.toml
//! ```

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use repowright::config::{ServerConfig, WorkerConfig};
use repowright::definition::adapters::load_task_catalog;
use repowright::run::services::DrainOutcome;
use repowright::server::{run_server, shutdown_signal};
use repowright::telemetry::init_tracing;
use repowright::worker::{
    adapters::{CommandProcessor, HttpWorkSource},
    services::Worker,
};
use std::sync::Arc;
use tracing::{error, info};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "repowright", version, about = "Schedules and executes repository automation tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the scheduling server.
    Server {
        /// Server configuration file.
        #[arg(long)]
        config: Utf8PathBuf,
    },
    /// Runs a worker polling the server for work.
    Worker {
        /// Worker configuration file.
        #[arg(long)]
        config: Utf8PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Server { config } => server(ServerConfig::load(&config)?).await,
        Command::Worker { config } => worker(WorkerConfig::load(&config)?).await,
    };
    if let Err(err) = &outcome {
        error!(error = %err, "repowright exited with an error");
    }
    outcome
}

async fn server(config: ServerConfig) -> Result<(), BoxError> {
    match run_server(config).await? {
        DrainOutcome::Drained => Ok(()),
        DrainOutcome::TimedOut { abandoned } => {
            Err(format!("{abandoned} run(s) did not report before the shutdown timeout").into())
        }
    }
}

async fn worker(config: WorkerConfig) -> Result<(), BoxError> {
    let (program, args) = config
        .processor_program()
        .ok_or("processor_command must name a program")?;
    let catalog = Arc::new(load_task_catalog(&config.tasks_dir)?);
    info!(tasks = catalog.len(), server = %config.server_base_url, "worker starting");

    let source = Arc::new(HttpWorkSource::new(&config.server_base_url)?);
    let processor = Arc::new(CommandProcessor::new(program, args.to_vec(), catalog));
    let handle = Worker::new(source, processor, config.worker_settings()).start();

    shutdown_signal().await;
    handle.stop().await;
    Ok(())
}
