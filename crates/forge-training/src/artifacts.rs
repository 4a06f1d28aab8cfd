use crate::error::{TrainingError, TrainingResult};
use crate::job::{Hyperparameters, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Open-ended numeric metrics snapshot (`train_loss`, `eval_loss`, ...).
pub type Metrics = BTreeMap<String, f64>;

/// Name of the metadata file a pipeline writes next to the adapter weights.
pub const TRAINING_METADATA_FILE: &str = "training_metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub path: String,
    pub train_samples: u64,
    pub eval_samples: u64,
}

/// Description of a finished run, persisted alongside the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub job_id: JobId,
    pub base_model: String,
    pub created_at: DateTime<Utc>,
    pub training_config: Hyperparameters,
    pub dataset: DatasetSummary,
    #[serde(default)]
    pub metrics: Metrics,
    pub training_time_seconds: f64,
}

impl TrainingMetadata {
    pub fn write_to(&self, adapter_dir: &Path) -> TrainingResult<()> {
        write_json(adapter_dir.join(TRAINING_METADATA_FILE), self)
    }

    pub fn read_from(adapter_dir: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(adapter_dir.join(TRAINING_METADATA_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of an adapter directory: the hash of its metadata file.
///
/// Returns `Ok(None)` when the artifact carries no metadata file.
pub fn artifact_fingerprint(artifact_path: &Path) -> TrainingResult<Option<String>> {
    if !artifact_path.exists() {
        return Err(TrainingError::Artifact(format!(
            "artifact path does not exist: {}",
            artifact_path.display()
        )));
    }
    let metadata = if artifact_path.is_dir() {
        artifact_path.join(TRAINING_METADATA_FILE)
    } else {
        artifact_path.to_path_buf()
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    sha256_file(&metadata).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata() -> TrainingMetadata {
        TrainingMetadata {
            job_id: JobId::from("job-1"),
            base_model: "mistralai/Mistral-7B-v0.1".to_string(),
            created_at: Utc::now(),
            training_config: Hyperparameters::default(),
            dataset: DatasetSummary { path: "/data/a.jsonl".to_string(), train_samples: 90, eval_samples: 10 },
            metrics: Metrics::from([("train_loss".to_string(), 1.25)]),
            training_time_seconds: 3.5,
        }
    }

    #[test]
    fn test_metadata_written_and_fingerprinted() {
        let temp = TempDir::new().unwrap();
        let meta = metadata();
        meta.write_to(temp.path()).unwrap();

        let loaded = TrainingMetadata::read_from(temp.path()).unwrap();
        assert_eq!(loaded.metrics.get("train_loss"), Some(&1.25));

        let fingerprint = artifact_fingerprint(temp.path()).unwrap().unwrap();
        assert_eq!(fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_without_metadata() {
        let temp = TempDir::new().unwrap();
        assert_eq!(artifact_fingerprint(temp.path()).unwrap(), None);
        assert!(artifact_fingerprint(&temp.path().join("missing")).is_err());
    }
}
