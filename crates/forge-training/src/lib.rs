//! Forge Training
//!
//! Backend-agnostic training primitives for:
//! - Describing fine-tuning jobs (`JobSpec`, `Hyperparameters`) and their lifecycle (`JobStatus`)
//! - Reporting pipeline progress (`ProgressSink`)
//! - Implementing training pipelines (`TrainingPipeline`)
//! - Writing training artifacts and describing registered models

pub mod artifacts;
pub mod error;
pub mod job;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod simulated;

pub use artifacts::{artifact_fingerprint, DatasetSummary, Metrics, TrainingMetadata, TRAINING_METADATA_FILE};
pub use error::{PipelineError, TrainingError, TrainingResult};
pub use job::{default_job_name, DatasetRef, Hyperparameters, Job, JobId, JobSpec, JobStatus};
pub use layout::TrainingLayout;
pub use model::{Model, ModelId};
pub use pipeline::{check_cancelled, PipelineOutput, PipelineRequest, TrainingPipeline};
pub use progress::{training_progress, LogProgressSink, PipelineStage, ProgressSink, ProgressUpdate};
pub use simulated::SimulatedPipeline;
pub use tokio_util::sync::CancellationToken;
