use crate::artifacts::Metrics;
use crate::error::{TrainingError, TrainingResult};
use crate::model::ModelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to a dataset owned by an external collaborator.
///
/// The orchestrator never opens the file itself; the path is handed to the
/// pipeline as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub id: String,
    pub path: PathBuf,
}

impl DatasetRef {
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { id: id.into(), path: path.into() }
    }
}

/// LoRA and optimizer settings for a fine-tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Adapter rank.
    pub lora_r: u32,
    /// Adapter scaling factor.
    pub lora_alpha: u32,
    pub lora_dropout: f64,
    pub learning_rate: f64,
    pub num_epochs: u32,
    pub batch_size: u32,
    /// Hard cap on optimizer steps; `None` trains for `num_epochs`.
    pub max_steps: Option<u64>,
    /// Fraction of the dataset held out for evaluation.
    pub eval_split: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            lora_r: 16,
            lora_alpha: 32,
            lora_dropout: 0.05,
            learning_rate: 2e-4,
            num_epochs: 3,
            batch_size: 4,
            max_steps: None,
            eval_split: 0.1,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.lora_r == 0 {
            return Err(TrainingError::InvalidSpec("lora_r must be >= 1".to_string()));
        }
        if self.lora_alpha == 0 {
            return Err(TrainingError::InvalidSpec("lora_alpha must be >= 1".to_string()));
        }
        if !self.lora_dropout.is_finite() || !(0.0..1.0).contains(&self.lora_dropout) {
            return Err(TrainingError::InvalidSpec("lora_dropout must be in [0, 1)".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidSpec("learning_rate must be > 0".to_string()));
        }
        if self.num_epochs == 0 {
            return Err(TrainingError::InvalidSpec("num_epochs must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidSpec("batch_size must be >= 1".to_string()));
        }
        if self.max_steps == Some(0) {
            return Err(TrainingError::InvalidSpec("max_steps must be >= 1 when set".to_string()));
        }
        if !self.eval_split.is_finite() || !(0.0..1.0).contains(&self.eval_split) {
            return Err(TrainingError::InvalidSpec("eval_split must be in [0, 1)".to_string()));
        }
        Ok(())
    }
}

/// Immutable configuration of a job, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub tenant_id: String,
    pub dataset: DatasetRef,
    pub base_model: String,
    pub name: String,
    pub hyperparameters: Hyperparameters,
}

impl JobSpec {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, dataset: DatasetRef, base_model: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            dataset,
            base_model: base_model.into(),
            name: default_job_name(Utc::now()),
            hyperparameters: Hyperparameters::default(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("tenant_id is required".to_string()));
        }
        // The tenant id names a directory under the models root.
        if self.tenant_id.contains("..")
            || !self.tenant_id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(TrainingError::InvalidSpec(format!(
                "tenant_id {:?} may only contain letters, digits, '-', '_' and '.'",
                self.tenant_id
            )));
        }
        if self.base_model.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("base_model is required".to_string()));
        }
        if self.dataset.id.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("dataset.id is required".to_string()));
        }
        self.hyperparameters.validate()
    }
}

#[must_use]
pub fn default_job_name(at: DateTime<Utc>) -> String {
    format!("training_job_{}", at.format("%Y%m%d_%H%M%S"))
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Checks whether the state machine has an edge from `self` to `to`.
    ///
    /// `Running -> Pending` is the retry edge.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Running | Self::Cancelled) => true,
            (Self::Running, Self::Completed | Self::Failed | Self::Pending | Self::Cancelled) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TrainingError::InvalidSpec(format!("unknown job status: {other}"))),
        }
    }
}

/// A job record: configuration plus the mutable execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub status: JobStatus,
    /// 0.0 - 100.0
    pub progress: f64,
    pub current_step: Option<u64>,
    pub total_steps: Option<u64>,
    #[serde(default)]
    pub metrics: Metrics,
    pub error_message: Option<String>,
    pub model_id: Option<ModelId>,
    /// Execution attempts started so far (retries included).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    #[must_use]
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            spec,
            status: JobStatus::Pending,
            progress: 0.0,
            current_step: None,
            total_steps: None,
            metrics: Metrics::new(),
            error_message: None,
            model_id: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
