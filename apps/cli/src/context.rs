//! Opening the configured store and catalog.

use anyhow::{Context, Result};
use colored::Colorize;
use forge_orchestrator::{
    InMemoryJobStore, JobStore, ModelCatalog, OrchestratorConfig, SqliteJobStore, StorageBackend, StorageConfig,
};
use forge_training::TrainingLayout;
use std::path::Path;
use std::sync::Arc;

/// Loads `path` if given, otherwise layers the global and local config files.
pub fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => OrchestratorConfig::discover_and_load().context("Failed to load configuration"),
    }
}

pub fn open_store(storage: &StorageConfig) -> Result<Arc<dyn JobStore>> {
    match storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryJobStore::new())),
        StorageBackend::Sqlite => {
            if let Some(parent) = storage.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            let store = SqliteJobStore::open(&storage.database_path)
                .with_context(|| format!("Failed to open job database {}", storage.database_path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub fn open_catalog(storage: &StorageConfig) -> Result<ModelCatalog> {
    let path = storage.catalog_path();
    ModelCatalog::open(&path).with_context(|| format!("Failed to open model catalog {}", path.display()))
}

pub fn layout(storage: &StorageConfig) -> TrainingLayout {
    TrainingLayout::new(&storage.models_dir)
}

/// Read-only commands see nothing with the memory backend.
pub fn warn_if_ephemeral(storage: &StorageConfig, json_output: bool) {
    if storage.backend == StorageBackend::Memory && !json_output {
        println!("{}", "Note: storage.backend is \"memory\"; jobs do not outlive `forge run`.".dimmed());
        println!();
    }
}
