//! Model registration.
//!
//! The store calls [`ModelRegistrar::register`] from inside the completion
//! step of a job, so a registrar must not call back into the store.

use forge_training::{artifact_fingerprint, Job, JobId, Metrics, Model, ModelId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("artifact not usable at {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },

    #[error("model catalog unavailable: {0}")]
    Catalog(String),
}

pub trait ModelRegistrar: Send + Sync {
    /// Records the model produced by `job`.
    fn register(&self, job: &Job, artifact_path: &Path, metrics: &Metrics) -> Result<Model, RegistrationError>;

    /// Undoes a registration whose job could not be persisted as completed.
    fn rollback(&self, _model_id: &ModelId) {}
}

#[derive(Debug, Default)]
struct CatalogState {
    models: BTreeMap<ModelId, Model>,
    by_job: BTreeMap<JobId, ModelId>,
}

/// Catalog of trained models, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    state: RwLock<CatalogState>,
    path: Option<PathBuf>,
}

impl ModelCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the catalog from `path` (if it exists) and writes every change
    /// back to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistrationError> {
        let path = path.into();
        let mut state = CatalogState::default();
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| RegistrationError::Catalog(e.to_string()))?;
            let models: Vec<Model> =
                serde_json::from_str(&content).map_err(|e| RegistrationError::Catalog(e.to_string()))?;
            for model in models {
                if let Some(job_id) = &model.job_id {
                    state.by_job.insert(job_id.clone(), model.id.clone());
                }
                state.models.insert(model.id.clone(), model);
            }
        }
        Ok(Self { state: RwLock::new(state), path: Some(path) })
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &CatalogState) -> Result<(), RegistrationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let models: Vec<&Model> = state.models.values().collect();
        let json = serde_json::to_string_pretty(&models).map_err(|e| RegistrationError::Catalog(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistrationError::Catalog(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| RegistrationError::Catalog(e.to_string()))
    }

    #[must_use]
    pub fn get(&self, id: &ModelId) -> Option<Model> {
        self.read().models.get(id).cloned()
    }

    #[must_use]
    pub fn get_by_job(&self, job_id: &JobId) -> Option<Model> {
        let state = self.read();
        state.by_job.get(job_id).and_then(|id| state.models.get(id)).cloned()
    }

    /// All models, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Model> {
        let mut models: Vec<Model> = self.read().models.values().cloned().collect();
        models.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        models
    }

    #[must_use]
    pub fn list_by_tenant(&self, tenant_id: &str) -> Vec<Model> {
        self.list().into_iter().filter(|m| m.tenant_id == tenant_id).collect()
    }

    /// Whether the job produced a model that is still active.
    #[must_use]
    pub fn has_active_model(&self, job_id: &JobId) -> bool {
        self.get_by_job(job_id).is_some_and(|m| m.is_active)
    }

    /// Marks a model inactive. Returns `false` if it does not exist.
    pub fn deactivate(&self, id: &ModelId) -> Result<bool, RegistrationError> {
        let mut state = self.write();
        let Some(model) = state.models.get_mut(id) else {
            return Ok(false);
        };
        model.is_active = false;
        self.persist(&state)?;
        info!(model_id = %id, "model deactivated");
        Ok(true)
    }
}

impl ModelRegistrar for ModelCatalog {
    fn register(&self, job: &Job, artifact_path: &Path, metrics: &Metrics) -> Result<Model, RegistrationError> {
        let fingerprint = artifact_fingerprint(artifact_path).map_err(|e| RegistrationError::Artifact {
            path: artifact_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut state = self.write();
        let model = Model::from_job(job, artifact_path.to_path_buf(), metrics.clone(), fingerprint);
        // An entry for this job can only come from an attempt whose completion
        // was never persisted; the new attempt replaces it.
        let previous = state.models.insert(model.id.clone(), model.clone());
        let previous_id = state.by_job.insert(job.id.clone(), model.id.clone());
        if previous.is_some() || previous_id.is_some() {
            warn!(model_id = %model.id, job_id = %job.id, "replacing model left by an unfinished completion");
        }
        if let Err(e) = self.persist(&state) {
            match previous {
                Some(previous) => {
                    state.models.insert(previous.id.clone(), previous);
                }
                None => {
                    state.models.remove(&model.id);
                }
            }
            match previous_id {
                Some(previous_id) => {
                    state.by_job.insert(job.id.clone(), previous_id);
                }
                None => {
                    state.by_job.remove(&job.id);
                }
            }
            return Err(e);
        }
        info!(model_id = %model.id, job_id = %job.id, artifact = %artifact_path.display(), "model registered");
        Ok(model)
    }

    fn rollback(&self, model_id: &ModelId) {
        let mut state = self.write();
        if let Some(model) = state.models.remove(model_id) {
            if let Some(job_id) = &model.job_id {
                state.by_job.remove(job_id);
            }
            if let Err(e) = self.persist(&state) {
                warn!(model_id = %model_id, error = %e, "failed to persist catalog rollback");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_training::{DatasetRef, JobSpec};
    use tempfile::TempDir;

    fn job() -> Job {
        Job::new(JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base"))
    }

    #[test]
    fn test_register_and_lookup() {
        let temp = TempDir::new().unwrap();
        let catalog = ModelCatalog::new();
        let job = job();

        let model = catalog.register(&job, temp.path(), &Metrics::new()).unwrap();
        assert_eq!(catalog.get(&model.id), Some(model.clone()));
        assert_eq!(catalog.get_by_job(&job.id), Some(model));
        assert!(catalog.has_active_model(&job.id));
        assert_eq!(catalog.list_by_tenant("ws").len(), 1);
    }

    #[test]
    fn test_register_replaces_unfinished_registration() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        let catalog = ModelCatalog::new();
        let job = job();

        let first = catalog.register(&job, first_dir.path(), &Metrics::new()).unwrap();
        let metrics = Metrics::from([("train_loss".to_string(), 0.25)]);
        let second = catalog.register(&job, second_dir.path(), &metrics).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(catalog.list().len(), 1);
        let stored = catalog.get_by_job(&job.id).unwrap();
        assert_eq!(stored.artifact_path, second_dir.path());
        assert_eq!(stored.metrics.get("train_loss"), Some(&0.25));
    }

    #[test]
    fn test_register_rejects_missing_artifact() {
        let catalog = ModelCatalog::new();
        let err = catalog.register(&job(), Path::new("/nonexistent/adapter"), &Metrics::new()).unwrap_err();
        assert!(matches!(err, RegistrationError::Artifact { .. }));
    }

    #[test]
    fn test_rollback_and_deactivate() {
        let temp = TempDir::new().unwrap();
        let catalog = ModelCatalog::new();
        let first = job();
        let second = job();

        let a = catalog.register(&first, temp.path(), &Metrics::new()).unwrap();
        let b = catalog.register(&second, temp.path(), &Metrics::new()).unwrap();

        catalog.rollback(&a.id);
        assert!(catalog.get_by_job(&first.id).is_none());

        assert!(catalog.deactivate(&b.id).unwrap());
        assert!(!catalog.has_active_model(&second.id));
        assert!(!catalog.deactivate(&a.id).unwrap());
    }

    #[test]
    fn test_persistent_catalog_reloads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("models.json");
        let job = job();
        {
            let catalog = ModelCatalog::open(&path).unwrap();
            catalog.register(&job, temp.path(), &Metrics::new()).unwrap();
        }
        let catalog = ModelCatalog::open(&path).unwrap();
        assert!(catalog.get_by_job(&job.id).is_some());
    }
}
