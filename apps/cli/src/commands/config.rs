//! `forge config`.

use super::types::ConfigCommand;
use crate::context;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use forge_orchestrator::OrchestratorConfig;
use std::path::Path;

pub fn execute(command: ConfigCommand, explicit: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => show(explicit, json),
        ConfigCommand::Init { local, force } => init(local, force),
        ConfigCommand::Path => {
            paths(explicit);
            Ok(())
        }
    }
}

fn show(explicit: Option<&Path>, json_output: bool) -> Result<()> {
    let config = context::load_config(explicit)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", "Effective configuration".bold().cyan());
        println!("{}", "─".repeat(60));
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn init(local: bool, force: bool) -> Result<()> {
    let path =
        if local { OrchestratorConfig::default_local_path() } else { OrchestratorConfig::default_global_path() };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    OrchestratorConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} Wrote default configuration to {}", "✓".green(), path.display().to_string().bold());
    Ok(())
}

fn paths(explicit: Option<&Path>) {
    println!("{}", "Configuration files".bold().cyan());
    if let Some(path) = explicit {
        println!("  {} {}", marker(path), path.display());
        return;
    }
    for path in [OrchestratorConfig::default_global_path(), OrchestratorConfig::default_local_path()] {
        println!("  {} {}", marker(&path), path.display());
    }
    println!("{}", "Later files override earlier ones.".dimmed());
}

fn marker(path: &Path) -> colored::ColoredString {
    if path.exists() { "✓".green() } else { "✗".dimmed() }
}
