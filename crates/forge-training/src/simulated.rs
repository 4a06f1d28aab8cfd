//! Demonstration pipeline.
//!
//! Walks through the same stages as a real fine-tuning run, sleeping instead
//! of computing, and writes a real `training_metadata.json` so the rest of the
//! system (registration, retention) can be exercised end to end.

use crate::artifacts::{DatasetSummary, Metrics, TrainingMetadata};
use crate::error::PipelineError;
use crate::pipeline::{check_cancelled, PipelineOutput, PipelineRequest, TrainingPipeline};
use crate::progress::{PipelineStage, ProgressSink, ProgressUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Datasets at or below this size are not split for evaluation.
const MIN_SAMPLES_FOR_EVAL: u64 = 10;

#[derive(Debug, Clone)]
pub struct SimulatedPipeline {
    /// Delay between optimizer steps.
    pub step_delay: Duration,
    /// Pretend dataset size.
    pub sample_count: u64,
    /// The first N attempts of every job fail with a resource-exhaustion error.
    pub transient_failures: u32,
}

impl Default for SimulatedPipeline {
    fn default() -> Self {
        Self { step_delay: Duration::from_millis(50), sample_count: 200, transient_failures: 0 }
    }
}

impl SimulatedPipeline {
    #[must_use]
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay, ..Self::default() }
    }

    #[must_use]
    pub fn with_sample_count(mut self, sample_count: u64) -> Self {
        self.sample_count = sample_count;
        self
    }

    #[must_use]
    pub fn with_transient_failures(mut self, attempts: u32) -> Self {
        self.transient_failures = attempts;
        self
    }

    fn split(&self, eval_split: f64) -> (u64, u64) {
        if eval_split > 0.0 && self.sample_count > MIN_SAMPLES_FOR_EVAL {
            let eval = ((self.sample_count as f64) * eval_split).round() as u64;
            (self.sample_count - eval, eval)
        } else {
            (self.sample_count, 0)
        }
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        tokio::select! {
            () = tokio::time::sleep(self.step_delay) => Ok(()),
            () = cancel.cancelled() => Err(PipelineError::Cancelled),
        }
    }
}

#[async_trait]
impl TrainingPipeline for SimulatedPipeline {
    fn id(&self) -> &'static str {
        "simulated"
    }

    async fn run(
        &self,
        request: &PipelineRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let hp = &request.hyperparameters;

        progress.report(ProgressUpdate::stage(PipelineStage::LoadingDataset));
        self.pause(cancel).await?;
        let (train_samples, eval_samples) = self.split(hp.eval_split);
        progress.report(ProgressUpdate::stage(PipelineStage::DatasetReady));

        check_cancelled(cancel)?;
        progress.report(ProgressUpdate::stage(PipelineStage::LoadingModel));
        self.pause(cancel).await?;

        if request.attempt <= self.transient_failures {
            return Err(PipelineError::resource_exhausted(format!(
                "CUDA out of memory while loading {} (attempt {})",
                request.base_model, request.attempt
            )));
        }

        let steps_per_epoch = train_samples.div_ceil(u64::from(hp.batch_size)).max(1);
        let total_steps = hp.max_steps.unwrap_or(steps_per_epoch * u64::from(hp.num_epochs));
        progress.report(ProgressUpdate::stage(PipelineStage::Training));

        let mut loss = 2.5_f64;
        for step in 1..=total_steps {
            check_cancelled(cancel)?;
            self.pause(cancel).await?;
            loss *= 0.97;
            let snapshot = Metrics::from([("loss".to_string(), loss), ("learning_rate".to_string(), hp.learning_rate)]);
            progress.report(ProgressUpdate::step(step, total_steps).with_metrics(snapshot));
        }
        progress.report(ProgressUpdate::stage(PipelineStage::TrainingComplete));
        debug!(job_id = %request.job_id, total_steps, "simulated training finished");

        let elapsed = started.elapsed().as_secs_f64();
        let mut metrics = Metrics::from([
            ("train_loss".to_string(), loss),
            ("train_runtime".to_string(), elapsed),
            ("samples_per_second".to_string(), if elapsed > 0.0 { train_samples as f64 / elapsed } else { 0.0 }),
            ("total_samples".to_string(), train_samples as f64),
        ]);

        if eval_samples > 0 {
            check_cancelled(cancel)?;
            progress.report(ProgressUpdate::stage(PipelineStage::Evaluating));
            self.pause(cancel).await?;
            metrics.insert("eval_loss".to_string(), loss * 1.1);
            metrics.insert("perplexity".to_string(), (loss * 1.1).exp());
        }

        check_cancelled(cancel)?;
        progress.report(ProgressUpdate::stage(PipelineStage::Saving));
        std::fs::create_dir_all(&request.output_dir)?;
        let metadata = TrainingMetadata {
            job_id: request.job_id.clone(),
            base_model: request.base_model.clone(),
            created_at: Utc::now(),
            training_config: hp.clone(),
            dataset: DatasetSummary {
                path: request.dataset_path.display().to_string(),
                train_samples,
                eval_samples,
            },
            metrics: metrics.clone(),
            training_time_seconds: started.elapsed().as_secs_f64(),
        };
        metadata.write_to(&request.output_dir)?;

        progress.report(ProgressUpdate::stage(PipelineStage::Completed).with_metrics(metrics.clone()));
        Ok(PipelineOutput { artifact_path: request.output_dir.clone(), metrics })
    }
}
