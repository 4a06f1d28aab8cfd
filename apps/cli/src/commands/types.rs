//! Command type definitions shared between main.rs and the command modules.

use clap::{Args, Subcommand};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Tenant (workspace) that owns the jobs
    #[arg(long, default_value = "default")]
    pub tenant: String,

    /// Dataset identifier
    #[arg(long, default_value = "demo-dataset")]
    pub dataset: String,

    /// Dataset location recorded on the job
    #[arg(long, default_value = "datasets/demo.jsonl")]
    pub dataset_path: String,

    /// Base model to fine-tune
    #[arg(long, default_value = "meta-llama/Llama-3.2-1B")]
    pub base_model: String,

    /// Job name (defaults to training_job_<timestamp>)
    #[arg(long)]
    pub name: Option<String>,

    /// Number of jobs to submit
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Training epochs
    #[arg(long, default_value_t = 1)]
    pub epochs: u32,

    /// Batch size
    #[arg(long, default_value_t = 8)]
    pub batch_size: u32,

    /// Learning rate
    #[arg(long, default_value_t = 2e-4)]
    pub learning_rate: f64,

    /// Stop after this many optimizer steps
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Simulated dataset size
    #[arg(long, default_value_t = 64)]
    pub samples: u64,

    /// Delay between simulated steps in milliseconds
    #[arg(long, default_value_t = 50)]
    pub step_delay_ms: u64,

    /// Fail the first N attempts of every job with an out-of-memory error
    #[arg(long, default_value_t = 0)]
    pub transient_failures: u32,

    /// Cancel the first submitted job after this many milliseconds
    #[arg(long)]
    pub cancel_after_ms: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelsCommand {
    /// List registered models
    List {
        /// Only models of this tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a registered model
    Show {
        /// Model ID
        model_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a model inactive so its artifacts can be cleaned up
    Deactivate {
        /// Model ID
        model_id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration to a file
    Init {
        /// Write .forgerc in the current directory instead of ~/.forge/config.toml
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show which configuration files are read
    Path,
}
