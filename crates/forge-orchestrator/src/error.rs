// Error types for job orchestration

use forge_training::{JobId, JobStatus};
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No job with this id exists.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The state machine has no edge between the two statuses.
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        /// Job id
        job_id: JobId,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// Operation on a job that already finished.
    #[error("Job {job_id} is already {status}")]
    AlreadyTerminal {
        /// Job id
        job_id: JobId,
        /// Terminal status the job is in
        status: JobStatus,
    },

    /// A write lost a race against a terminal transition or a newer execution.
    #[error("Stale transition for job {job_id}: {reason}")]
    StaleTransition {
        /// Job id
        job_id: JobId,
        /// What made the write stale
        reason: String,
    },

    /// Pipeline failure eligible for retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Non-recoverable failure.
    #[error("Fatal failure: {0}")]
    Fatal(String),

    /// Rejected job submission
    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scheduler lifecycle error (already running, not running, ...)
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestrationError {
    pub(crate) fn stale(job_id: &JobId, reason: impl Into<String>) -> Self {
        Self::StaleTransition { job_id: job_id.clone(), reason: reason.into() }
    }
}

impl From<rusqlite::Error> for OrchestrationError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<forge_training::TrainingError> for OrchestrationError {
    fn from(err: forge_training::TrainingError) -> Self {
        match err {
            forge_training::TrainingError::InvalidSpec(msg) => Self::InvalidSpec(msg),
            forge_training::TrainingError::Io(e) => Self::Io(e),
            forge_training::TrainingError::Json(e) => Self::Json(e),
            other => Self::Storage(other.to_string()),
        }
    }
}
