//! `forge models`.

use super::render;
use super::types::ModelsCommand;
use crate::context;
use anyhow::{bail, Result};
use colored::Colorize;
use forge_orchestrator::OrchestratorConfig;
use forge_training::ModelId;

pub fn execute(config: &OrchestratorConfig, command: ModelsCommand) -> Result<()> {
    let catalog = context::open_catalog(&config.storage)?;

    match command {
        ModelsCommand::List { tenant, json } => {
            let models = match tenant.as_deref() {
                Some(tenant) => catalog.list_by_tenant(tenant),
                None => catalog.list(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                println!("{}", "No registered models.".yellow());
                println!("{}", "Models are registered when a training job completes.".dimmed());
            } else {
                println!("{}", format!("Registered Models ({})", models.len()).bold().cyan());
                println!();
                render::print_model_table(&models);
            }
        }
        ModelsCommand::Show { model_id, json } => {
            let Some(model) = catalog.get(&ModelId(model_id.clone())) else {
                bail!("Model not found: {model_id}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
            } else {
                render::print_model_detail(&model);
            }
        }
        ModelsCommand::Deactivate { model_id } => {
            if catalog.deactivate(&ModelId(model_id.clone()))? {
                println!("{} Model {} deactivated", "✓".green(), model_id.bold());
            } else {
                bail!("Model not found: {model_id}");
            }
        }
    }
    Ok(())
}
