use crate::artifacts::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LoadingDataset,
    DatasetReady,
    LoadingModel,
    Training,
    TrainingComplete,
    Evaluating,
    Saving,
    Completed,
}

/// Start of the training band; step progress is spread over 20..85.
pub const TRAINING_START: f64 = 20.0;
/// End of the training band.
pub const TRAINING_END: f64 = 85.0;

impl PipelineStage {
    /// Progress percentage reported when the stage begins.
    #[must_use]
    pub fn milestone(self) -> f64 {
        match self {
            Self::LoadingDataset => 5.0,
            Self::DatasetReady => 10.0,
            Self::LoadingModel => 15.0,
            Self::Training => TRAINING_START,
            Self::TrainingComplete => TRAINING_END,
            Self::Evaluating => 90.0,
            Self::Saving => 95.0,
            Self::Completed => 100.0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadingDataset => "loading_dataset",
            Self::DatasetReady => "dataset_ready",
            Self::LoadingModel => "loading_model",
            Self::Training => "training",
            Self::TrainingComplete => "training_complete",
            Self::Evaluating => "evaluating",
            Self::Saving => "saving",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an optimizer step onto the training band.
#[must_use]
pub fn training_progress(step: u64, total_steps: u64) -> f64 {
    if total_steps == 0 {
        return TRAINING_START;
    }
    let fraction = (step.min(total_steps) as f64) / (total_steps as f64);
    TRAINING_START + fraction * (TRAINING_END - TRAINING_START)
}

/// One incremental report from a running pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: Option<PipelineStage>,
    /// 0.0 - 100.0
    pub progress: f64,
    pub step: Option<u64>,
    pub total_steps: Option<u64>,
    pub metrics: Option<Metrics>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(progress: f64) -> Self {
        Self { stage: None, progress, step: None, total_steps: None, metrics: None }
    }

    /// Milestone report for entering `stage`.
    #[must_use]
    pub fn stage(stage: PipelineStage) -> Self {
        Self { stage: Some(stage), ..Self::new(stage.milestone()) }
    }

    /// Step report inside the training band.
    #[must_use]
    pub fn step(step: u64, total_steps: u64) -> Self {
        Self {
            stage: Some(PipelineStage::Training),
            progress: training_progress(step, total_steps),
            step: Some(step),
            total_steps: Some(total_steps),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Write side of the progress channel handed to a pipeline.
///
/// Reports are fire-and-forget: a sink never fails the caller and may drop
/// updates it no longer cares about.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Sink that only logs. Useful when running a pipeline outside the orchestrator.
#[derive(Debug, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn report(&self, update: ProgressUpdate) {
        let stage = update.stage.map_or("progress", PipelineStage::as_str);
        match (update.step, update.total_steps) {
            (Some(step), Some(total)) => info!(stage, progress = update.progress, "step {step}/{total}"),
            (Some(step), None) => info!(stage, progress = update.progress, "step {step}"),
            _ => info!(stage, progress = update.progress, "pipeline progress"),
        }
    }
}
