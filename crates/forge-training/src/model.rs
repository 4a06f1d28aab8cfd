use crate::artifacts::Metrics;
use crate::job::{Job, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable identifier of a registered model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    /// Models are keyed by the job that produced them (`trained:<job_id>`).
    #[must_use]
    pub fn for_job(job_id: &JobId) -> Self {
        Self(format!("trained:{job_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A fine-tuned adapter produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    /// Originating job. `None` only for out-of-band imports.
    pub job_id: Option<JobId>,
    pub tenant_id: String,
    pub name: String,
    pub base_model: String,
    pub artifact_path: PathBuf,
    /// SHA-256 of the adapter's metadata file, when it has one.
    pub artifact_sha256: Option<String>,
    #[serde(default)]
    pub metrics: Metrics,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    #[must_use]
    pub fn from_job(job: &Job, artifact_path: PathBuf, metrics: Metrics, artifact_sha256: Option<String>) -> Self {
        Self {
            id: ModelId::for_job(&job.id),
            job_id: Some(job.id.clone()),
            tenant_id: job.spec.tenant_id.clone(),
            name: job.spec.name.clone(),
            base_model: job.spec.base_model.clone(),
            artifact_path,
            artifact_sha256,
            metrics,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DatasetRef, JobSpec};

    #[test]
    fn test_model_from_job() {
        let job = Job::new(
            JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base").with_name("support-bot"),
        );
        let model = Model::from_job(&job, PathBuf::from("/m/adapter"), Metrics::new(), None);

        assert_eq!(model.id, ModelId::for_job(&job.id));
        assert!(model.id.as_str().starts_with("trained:"));
        assert_eq!(model.job_id.as_ref(), Some(&job.id));
        assert_eq!(model.name, "support-bot");
        assert!(model.is_active);
    }
}
