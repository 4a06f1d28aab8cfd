use crate::artifacts::Metrics;
use crate::error::PipelineError;
use crate::job::{Hyperparameters, Job, JobId};
use crate::layout::TrainingLayout;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Everything a pipeline needs to run one attempt of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub job_id: JobId,
    pub tenant_id: String,
    pub base_model: String,
    pub dataset_path: PathBuf,
    /// Directory the adapter should be written to.
    pub output_dir: PathBuf,
    pub hyperparameters: Hyperparameters,
    /// 1-based attempt number of this execution.
    pub attempt: u32,
}

impl PipelineRequest {
    #[must_use]
    pub fn for_job(job: &Job, layout: &TrainingLayout, attempt: u32) -> Self {
        Self {
            job_id: job.id.clone(),
            tenant_id: job.spec.tenant_id.clone(),
            base_model: job.spec.base_model.clone(),
            dataset_path: job.spec.dataset.path.clone(),
            output_dir: layout.adapter_dir(&job.spec.tenant_id, &job.id),
            hyperparameters: job.spec.hyperparameters.clone(),
            attempt,
        }
    }
}

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub metrics: Metrics,
}

/// A training computation the orchestrator can run.
///
/// Implementations report milestones through `progress` and poll `cancel`
/// between steps, returning [`PipelineError::Cancelled`] once they observe it.
/// Cancellation is advisory: the orchestrator never aborts a run that keeps
/// going, it only stops listening to it.
#[async_trait]
pub trait TrainingPipeline: Send + Sync {
    fn id(&self) -> &'static str;

    async fn run(
        &self,
        request: &PipelineRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError>;
}

/// Returns `Err(Cancelled)` if cancellation has been requested.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DatasetRef, JobSpec};

    #[test]
    fn test_request_for_job_uses_layout() {
        let job = Job::new(JobSpec::new("42", DatasetRef::new("ds", "/data/ds.jsonl"), "base-model"));
        let layout = TrainingLayout::new("/models");
        let request = PipelineRequest::for_job(&job, &layout, 2);

        assert_eq!(request.attempt, 2);
        assert_eq!(request.dataset_path, PathBuf::from("/data/ds.jsonl"));
        assert_eq!(request.output_dir, layout.adapter_dir("42", &job.id));
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token).is_ok());
        token.cancel();
        assert_eq!(check_cancelled(&token), Err(PipelineError::Cancelled));
    }
}
