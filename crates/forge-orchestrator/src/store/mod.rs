//! Job persistence.
//!
//! The [`JobStore`] is the single source of truth for job state. Every status
//! change goes through [`JobStore::transition`] (or [`JobStore::complete`]),
//! which validates the edge against the job state machine and applies it
//! atomically per job. Terminal states are sticky.
//!
//! Each entry into `running` allocates a generation token (the attempt
//! number). Progress writes and transitions out of `running` carry that token
//! and are rejected once it is no longer the job's active generation, so a
//! superseded execution can never overwrite a newer one.

mod memory;
mod sqlite;

pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;

use crate::error::{OrchestrationError, Result};
use crate::registrar::ModelRegistrar;
use chrono::{DateTime, Utc};
use forge_training::{Job, JobId, JobSpec, JobStatus, Metrics, Model, PipelineOutput, ProgressUpdate};
use tracing::{debug, warn};

/// Execution attempt token. Equal to the attempt number that allocated it.
pub type Generation = u32;

/// Optional fields applied together with a status change.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    /// Generation the caller is acting for. When set, transitions out of
    /// `running` are rejected unless it is the active generation.
    pub generation: Option<Generation>,
    /// Stored on `failed`.
    pub error_message: Option<String>,
    /// Replaces the metrics snapshot.
    pub metrics: Option<Metrics>,
}

impl TransitionFields {
    #[must_use]
    pub fn for_generation(generation: Generation) -> Self {
        Self { generation: Some(generation), ..Self::default() }
    }

    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Whether a progress or metrics write was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The write belonged to an execution that is no longer active.
    Dropped,
}

/// Result of [`JobStore::complete`].
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Job is `completed` and its model is registered.
    Completed { job: Job, model: Model },
    /// Registration failed; the job is `failed` with `reason` as its error.
    RegistrationFailed { job: Job, reason: String },
}

pub trait JobStore: Send + Sync {
    /// Persists a new `pending` job.
    fn create(&self, spec: JobSpec) -> Result<Job>;

    fn get(&self, id: &JobId) -> Result<Job>;

    /// All jobs, newest first.
    fn list(&self) -> Result<Vec<Job>>;

    fn active_generation(&self, id: &JobId) -> Result<Option<Generation>>;

    /// Moves a job along one edge of the state machine.
    ///
    /// `completed` is only reachable through [`JobStore::complete`].
    fn transition(&self, id: &JobId, to: JobStatus, fields: TransitionFields) -> Result<Job>;

    /// Applies a progress report if `generation` is the job's active one.
    fn record_progress(&self, id: &JobId, generation: Generation, update: &ProgressUpdate) -> Result<WriteOutcome>;

    /// Merges a metrics snapshot (last write wins per key) if `generation` is active.
    fn append_metrics(&self, id: &JobId, generation: Generation, metrics: &Metrics) -> Result<WriteOutcome>;

    /// Registers the job's model and marks it `completed` in one step.
    ///
    /// If registration fails the job is failed instead, so a `completed` job
    /// always has a model.
    fn complete(
        &self,
        id: &JobId,
        generation: Generation,
        output: &PipelineOutput,
        registrar: &dyn ModelRegistrar,
    ) -> Result<CompletionOutcome>;

    fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Job>> {
        Ok(self.list()?.into_iter().filter(|j| j.spec.tenant_id == tenant_id).collect())
    }

    /// Jobs in `status`, oldest first (creation time, then id), which is the
    /// order recovery queues them in.
    fn list_with_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.list()?.into_iter().filter(|j| j.status == status).collect();
        jobs.reverse();
        Ok(jobs)
    }

    /// Terminal jobs that finished before `cutoff`.
    fn terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|j| j.is_terminal() && j.completed_at.is_some_and(|at| at < cutoff))
            .collect())
    }
}

/// A job plus the bookkeeping the store keeps next to it.
#[derive(Debug, Clone)]
pub(crate) struct StoredJob {
    pub(crate) job: Job,
    pub(crate) active: Option<Generation>,
}

impl StoredJob {
    pub(crate) fn new(job: Job) -> Self {
        Self { job, active: None }
    }

    fn check_transition(&self, to: JobStatus, generation: Option<Generation>) -> Result<()> {
        let from = self.job.status;
        if from.is_terminal() {
            return Err(OrchestrationError::stale(&self.job.id, format!("job is already {from}")));
        }
        if !from.can_transition_to(to) {
            return Err(OrchestrationError::InvalidTransition { job_id: self.job.id.clone(), from, to });
        }
        if from == JobStatus::Running {
            if let Some(generation) = generation {
                if self.active != Some(generation) {
                    return Err(OrchestrationError::stale(
                        &self.job.id,
                        format!("generation {generation} is no longer active"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, to: JobStatus, fields: TransitionFields, now: DateTime<Utc>) {
        let job = &mut self.job;
        match to {
            JobStatus::Running => {
                job.attempts += 1;
                self.active = Some(job.attempts);
                job.started_at.get_or_insert(now);
            }
            JobStatus::Pending => {
                // Retry: the next attempt starts its progress from scratch.
                self.active = None;
                job.progress = 0.0;
                job.current_step = None;
            }
            JobStatus::Completed => {
                self.active = None;
                job.progress = 100.0;
                job.completed_at = Some(now);
            }
            JobStatus::Failed => {
                self.active = None;
                job.error_message =
                    Some(fields.error_message.clone().unwrap_or_else(|| "unknown error".to_string()));
                job.completed_at = Some(now);
            }
            JobStatus::Cancelled => {
                self.active = None;
                job.completed_at = Some(now);
            }
        }
        if let Some(metrics) = fields.metrics {
            job.metrics = metrics;
        }
        debug!(job_id = %job.id, from = %job.status, to = %to, "job transition");
        job.status = to;
    }

    pub(crate) fn transition(&mut self, to: JobStatus, fields: TransitionFields, now: DateTime<Utc>) -> Result<()> {
        if to == JobStatus::Completed {
            return Err(OrchestrationError::InvalidTransition {
                job_id: self.job.id.clone(),
                from: self.job.status,
                to,
            });
        }
        self.check_transition(to, fields.generation)?;
        self.apply(to, fields, now);
        Ok(())
    }

    fn is_live(&self, generation: Generation) -> bool {
        self.job.status == JobStatus::Running && self.active == Some(generation)
    }

    pub(crate) fn record_progress(&mut self, generation: Generation, update: &ProgressUpdate) -> WriteOutcome {
        if !self.is_live(generation) {
            warn!(
                job_id = %self.job.id,
                generation,
                active = ?self.active,
                status = %self.job.status,
                "dropping progress from inactive execution"
            );
            return WriteOutcome::Dropped;
        }
        let job = &mut self.job;
        if update.progress.is_finite() {
            job.progress = job.progress.max(update.progress.clamp(0.0, 100.0));
        }
        if update.step.is_some() {
            job.current_step = update.step;
        }
        if update.total_steps.is_some() {
            job.total_steps = update.total_steps;
        }
        if let Some(metrics) = &update.metrics {
            job.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        }
        WriteOutcome::Applied
    }

    pub(crate) fn append_metrics(&mut self, generation: Generation, metrics: &Metrics) -> WriteOutcome {
        if !self.is_live(generation) {
            return WriteOutcome::Dropped;
        }
        self.job.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        WriteOutcome::Applied
    }

    /// Runs registration and applies the resulting transition.
    ///
    /// On success returns the registered model; the caller persists the job
    /// and rolls the registration back if persisting fails.
    pub(crate) fn complete(
        &mut self,
        generation: Generation,
        output: &PipelineOutput,
        registrar: &dyn ModelRegistrar,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        self.check_transition(JobStatus::Completed, Some(generation))?;
        match registrar.register(&self.job, &output.artifact_path, &output.metrics) {
            Ok(model) => {
                let fields = TransitionFields { metrics: Some(output.metrics.clone()), ..TransitionFields::default() };
                self.apply(JobStatus::Completed, fields, now);
                self.job.model_id = Some(model.id.clone());
                Ok(CompletionOutcome::Completed { job: self.job.clone(), model })
            }
            Err(e) => {
                let reason = format!("model registration failed: {e}");
                self.apply(JobStatus::Failed, TransitionFields::default().with_error(reason.clone()), now);
                Ok(CompletionOutcome::RegistrationFailed { job: self.job.clone(), reason })
            }
        }
    }
}
