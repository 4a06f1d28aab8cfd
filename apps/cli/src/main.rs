//! Forge CLI - Command-line interface for the Forge training orchestrator
//!
//! This CLI provides a `forge` command for running fine-tuning jobs through
//! the single-slot scheduler and inspecting jobs and registered models.

mod commands;
mod context;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{cleanup, config, jobs, models, run};
use commands::{ConfigCommand, ModelsCommand, RunArgs};

/// Forge CLI - Training job orchestration
///
/// Forge queues fine-tuning jobs, runs them one at a time, retries transient
/// failures and registers the resulting adapters as models.
#[derive(Parser, Debug)]
#[command(
    name = "forge",
    author,
    version,
    about = "Forge - Training job orchestration",
    long_about = "Forge runs LoRA fine-tuning jobs on a single execution slot.\nJobs are persisted, retried on transient failures and registered as models when they complete."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Configuration file (overrides ~/.forge/config.toml and .forgerc)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run training jobs in this process
    ///
    /// Submits one or more jobs to a local scheduler backed by the simulated
    /// pipeline and follows them until they finish. Pending jobs left over
    /// from a previous run are recovered first.
    Run(RunArgs),

    /// List training jobs
    List {
        /// Only jobs of this tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Only jobs in this status (pending, running, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single training job
    Status {
        /// Job ID
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Registered models
    #[command(subcommand)]
    Models(ModelsCommand),

    /// Delete artifacts of old terminal jobs
    ///
    /// Jobs whose model is still active keep their artifacts.
    Cleanup {
        /// Retention window in days (defaults to storage.retention_days)
        #[arg(long)]
        retention_days: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let load_config = || context::load_config(args.config.as_deref());

    match command {
        Command::Run(run_args) => run::execute(&load_config()?, &run_args).await?,
        Command::List { tenant, status, json } => {
            jobs::list(&load_config()?, tenant.as_deref(), status.as_deref(), json)?;
        }
        Command::Status { job_id, json } => jobs::status(&load_config()?, &job_id, json)?,
        Command::Models(cmd) => models::execute(&load_config()?, cmd)?,
        Command::Cleanup { retention_days, json } => cleanup::execute(&load_config()?, retention_days, json)?,
        // Works on the files themselves, so a broken file must not stop it.
        Command::Config(cmd) => config::execute(cmd, args.config.as_deref())?,
    }

    Ok(())
}
