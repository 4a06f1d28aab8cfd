//! `forge cleanup`.

use crate::context;
use anyhow::Result;
use colored::Colorize;
use forge_orchestrator::{cleanup_artifacts, OrchestratorConfig};
use serde_json::json;

pub fn execute(config: &OrchestratorConfig, retention_days: Option<u32>, json_output: bool) -> Result<()> {
    let retention_days = retention_days.unwrap_or(config.storage.retention_days);
    let store = context::open_store(&config.storage)?;
    let catalog = context::open_catalog(&config.storage)?;
    let layout = context::layout(&config.storage);

    let report = cleanup_artifacts(store.as_ref(), &catalog, &layout, retention_days)?;

    if json_output {
        let removed: Vec<&str> = report.removed.iter().map(|id| id.as_str()).collect();
        let kept: Vec<&str> = report.kept_active.iter().map(|id| id.as_str()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "retention_days": retention_days,
                "removed": removed,
                "kept_active": kept,
            }))?
        );
        return Ok(());
    }

    println!("{}", format!("Artifact cleanup (older than {retention_days} days)").bold().cyan());
    println!();
    if report.removed.is_empty() {
        println!("  {}", "Nothing to remove.".dimmed());
    }
    for id in &report.removed {
        println!("  {} removed {}", "✓".green(), id);
    }
    for id in &report.kept_active {
        println!("  {} kept {} (model still active)", "•".yellow(), id);
    }
    Ok(())
}
