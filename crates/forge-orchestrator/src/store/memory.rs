use super::{CompletionOutcome, Generation, JobStore, StoredJob, TransitionFields, WriteOutcome};
use crate::error::{OrchestrationError, Result};
use crate::registrar::ModelRegistrar;
use chrono::Utc;
use forge_training::{Job, JobId, JobSpec, JobStatus, Metrics, PipelineOutput, ProgressUpdate};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Process-local job store.
///
/// All operations on a job happen under one write lock, which is what makes
/// transitions atomic and keeps registration inside the completion step.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, StoredJob>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, StoredJob>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, StoredJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job<T>(&self, id: &JobId, f: impl FnOnce(&mut StoredJob) -> Result<T>) -> Result<T> {
        let mut jobs = self.write();
        let stored = jobs.get_mut(id).ok_or_else(|| OrchestrationError::NotFound(id.clone()))?;
        f(stored)
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, spec: JobSpec) -> Result<Job> {
        spec.validate()?;
        let job = Job::new(spec);
        info!(job_id = %job.id, tenant_id = %job.spec.tenant_id, "job created");
        self.write().insert(job.id.clone(), StoredJob::new(job.clone()));
        Ok(job)
    }

    fn get(&self, id: &JobId) -> Result<Job> {
        self.read().get(id).map(|s| s.job.clone()).ok_or_else(|| OrchestrationError::NotFound(id.clone()))
    }

    fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.read().values().map(|s| s.job.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(jobs)
    }

    fn active_generation(&self, id: &JobId) -> Result<Option<Generation>> {
        self.read().get(id).map(|s| s.active).ok_or_else(|| OrchestrationError::NotFound(id.clone()))
    }

    fn transition(&self, id: &JobId, to: JobStatus, fields: TransitionFields) -> Result<Job> {
        self.with_job(id, |stored| {
            stored.transition(to, fields, Utc::now())?;
            Ok(stored.job.clone())
        })
    }

    fn record_progress(&self, id: &JobId, generation: Generation, update: &ProgressUpdate) -> Result<WriteOutcome> {
        self.with_job(id, |stored| Ok(stored.record_progress(generation, update)))
    }

    fn append_metrics(&self, id: &JobId, generation: Generation, metrics: &Metrics) -> Result<WriteOutcome> {
        self.with_job(id, |stored| Ok(stored.append_metrics(generation, metrics)))
    }

    fn complete(
        &self,
        id: &JobId,
        generation: Generation,
        output: &PipelineOutput,
        registrar: &dyn ModelRegistrar,
    ) -> Result<CompletionOutcome> {
        self.with_job(id, |stored| stored.complete(generation, output, registrar, Utc::now()))
    }
}
