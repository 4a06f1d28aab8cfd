use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training job spec: {0}")]
    InvalidSpec(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure returned by a training pipeline run.
///
/// The orchestrator only looks at the variant to decide between retrying and
/// failing the job; the message is stored verbatim as the job's error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The execution environment ran out of a resource (accelerator memory,
    /// disk, ...). Usually worth another attempt.
    #[error("{0}")]
    ResourceExhausted(String),

    /// The pipeline observed the cancellation signal and unwound.
    #[error("training cancelled")]
    Cancelled,

    /// Any other stage failure.
    #[error("{0}")]
    Failed(String),
}

impl PipelineError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    #[must_use]
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted(message.into())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<TrainingError> for PipelineError {
    fn from(err: TrainingError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_message_is_verbatim() {
        let err = PipelineError::failed("tokenizer config missing");
        assert_eq!(err.to_string(), "tokenizer config missing");

        let err = PipelineError::resource_exhausted("CUDA out of memory. Tried to allocate 2.00 GiB");
        assert_eq!(err.to_string(), "CUDA out of memory. Tried to allocate 2.00 GiB");
    }

    #[test]
    fn test_training_error_converts_to_failed() {
        let err: PipelineError = TrainingError::InvalidSpec("epochs must be >= 1".to_string()).into();
        assert_eq!(err, PipelineError::Failed("invalid training job spec: epochs must be >= 1".to_string()));
        assert!(!err.is_cancelled());
    }
}
