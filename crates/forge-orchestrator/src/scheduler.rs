//! Single-slot job scheduler.
//!
//! One dispatch loop pulls jobs off the FIFO queue and runs at most one
//! pipeline at a time. The slot is a semaphore with a single permit; the loop
//! takes the permit before it dequeues, so queued jobs keep their order and a
//! second job can never enter `running` while the slot is held.
//!
//! Each execution runs the pipeline on its own task, supervised by a second
//! task that enforces the per-job timeout and the cancellation grace period
//! and performs the final transition. The final transition always happens
//! before the permit is released.

use crate::config::SchedulerConfig;
use crate::error::{OrchestrationError, Result};
use crate::events::JobEventReporter;
use crate::queue::JobQueue;
use crate::registrar::ModelRegistrar;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sink::StoreProgressSink;
use crate::store::{CompletionOutcome, Generation, JobStore, TransitionFields};
use forge_training::{
    Job, JobId, JobSpec, JobStatus, PipelineError, PipelineOutput, PipelineRequest, TrainingLayout, TrainingPipeline,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a running execution was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `Scheduler::cancel` was called.
    Requested,
    /// The job ran past its time limit.
    Timeout,
    /// The scheduler is shutting down.
    Shutdown,
}

/// Result of [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was pending and is now `cancelled`.
    Cancelled,
    /// The job is running; it becomes `cancelled` once the pipeline unwinds.
    Requested,
}

/// Binds a running job to its cancellation token and generation.
///
/// Lives from the moment the job enters `running` until its final transition.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub job_id: JobId,
    pub generation: Generation,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl ExecutionHandle {
    fn new(job_id: JobId, generation: Generation) -> Self {
        Self { job_id, generation, token: CancellationToken::new(), reason: Arc::new(OnceLock::new()) }
    }

    /// Signals the pipeline. The first reason given sticks.
    pub fn request_cancel(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Counts of jobs picked up by [`Scheduler::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pending jobs put back on the queue.
    pub requeued: usize,
    /// Jobs left `running` by a previous process, reset to `pending`.
    pub orphaned: usize,
}

/// How an execution ended, before it is mapped to a transition.
#[derive(Debug)]
enum RunOutcome {
    Finished(std::result::Result<PipelineOutput, PipelineError>),
    /// The pipeline task panicked.
    Crashed(String),
    /// Cancellation was requested and the pipeline did not return within the
    /// grace period.
    Unresponsive(CancelReason),
}

/// The transition an execution outcome leads to.
#[derive(Debug, PartialEq)]
enum Resolution {
    Complete(PipelineOutput),
    Retry { delay: Duration, error: String },
    /// Interrupted by shutdown: back to `pending`, first in line.
    Requeue,
    Fail(String),
    Cancel { forced: bool },
}

fn time_limit_exceeded(config: &SchedulerConfig) -> String {
    format!("job exceeded its time limit of {}s", config.job_timeout.unwrap_or_default().as_secs_f64())
}

fn resolve(
    outcome: RunOutcome,
    requested: Option<CancelReason>,
    policy: &RetryPolicy,
    attempt: u32,
    config: &SchedulerConfig,
) -> Resolution {
    let result = match outcome {
        RunOutcome::Unresponsive(CancelReason::Timeout) => {
            return Resolution::Fail(format!(
                "{} and did not stop within {}s",
                time_limit_exceeded(config),
                config.cancel_grace.as_secs_f64()
            ));
        }
        RunOutcome::Unresponsive(CancelReason::Shutdown) => return Resolution::Requeue,
        RunOutcome::Unresponsive(CancelReason::Requested) => return Resolution::Cancel { forced: true },
        RunOutcome::Crashed(message) => return Resolution::Fail(format!("training pipeline crashed: {message}")),
        RunOutcome::Finished(result) => result,
    };

    match (result, requested) {
        // Output that arrives after the deadline is discarded.
        (Ok(_), Some(CancelReason::Timeout)) => Resolution::Fail(time_limit_exceeded(config)),
        (Err(_), Some(CancelReason::Shutdown)) => Resolution::Requeue,
        (_, Some(CancelReason::Requested | CancelReason::Timeout)) | (Err(PipelineError::Cancelled), _) => {
            Resolution::Cancel { forced: false }
        }
        (Ok(output), _) => Resolution::Complete(output),
        (Err(e), _) => match policy.decide(policy.classify(&e), attempt) {
            RetryDecision::Retry { delay } => Resolution::Retry { delay, error: e.to_string() },
            RetryDecision::GiveUp => Resolution::Fail(e.to_string()),
        },
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

struct Shared {
    store: Arc<dyn JobStore>,
    pipeline: Arc<dyn TrainingPipeline>,
    registrar: Arc<dyn ModelRegistrar>,
    layout: TrainingLayout,
    retry: RetryPolicy,
    config: SchedulerConfig,
    events: JobEventReporter,
    queue: JobQueue,
    slot: Arc<Semaphore>,
    /// Running executions. Held (never across an await) around every store
    /// operation that moves a job into or out of `running`, so `cancel` sees
    /// either a pending job or a running job with its handle.
    handles: Mutex<HashMap<JobId, ExecutionHandle>>,
    shutdown: Mutex<CancellationToken>,
}

impl Shared {
    fn handles(&self) -> MutexGuard<'_, HashMap<JobId, ExecutionHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        info!(pipeline = self.pipeline.id(), "scheduler started");
        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&self.slot).acquire_owned() => {
                    let Ok(permit) = permit else {
                        error!("execution slot closed, stopping scheduler");
                        break;
                    };
                    permit
                }
            };

            let next = loop {
                if let Some(job_id) = self.queue.dequeue() {
                    break Some(job_id);
                }
                tokio::select! {
                    () = shutdown.cancelled() => break None,
                    () = self.queue.notified() => {}
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            };
            let Some(job_id) = next else { break };
            Arc::clone(&self).dispatch(job_id, permit);
        }
        info!("scheduler stopped");
    }

    /// Moves a dequeued job into `running` and spawns its execution.
    fn dispatch(self: Arc<Self>, job_id: JobId, permit: OwnedSemaphorePermit) {
        let (job, handle) = {
            let mut handles = self.handles();
            let job = match self.store.transition(&job_id, JobStatus::Running, TransitionFields::default()) {
                Ok(job) => job,
                Err(e @ (OrchestrationError::StaleTransition { .. } | OrchestrationError::NotFound(_))) => {
                    debug!(job_id = %job_id, error = %e, "skipping queued job");
                    return;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "failed to start job");
                    return;
                }
            };
            let handle = ExecutionHandle::new(job_id.clone(), job.attempts);
            handles.insert(job_id.clone(), handle.clone());
            (job, handle)
        };

        info!(job_id = %job.id, generation = handle.generation, base_model = %job.spec.base_model, "job started");
        self.events.job_started(&job.id, handle.generation, self.queue.len());
        tokio::spawn(async move { self.execute(job, handle, permit).await });
    }

    async fn execute(self: Arc<Self>, job: Job, handle: ExecutionHandle, permit: OwnedSemaphorePermit) {
        let _permit = permit;
        let generation = handle.generation;
        let request = PipelineRequest::for_job(&job, &self.layout, generation);
        let sink = StoreProgressSink::new(Arc::clone(&self.store), self.events.clone(), job.id.clone(), generation);
        let pipeline = Arc::clone(&self.pipeline);
        let token = handle.token.clone();
        let mut run: JoinHandle<_> = tokio::spawn(async move { pipeline.run(&request, &sink, &token).await });

        let outcome = self.supervise(&mut run, &handle).await;
        if matches!(outcome, RunOutcome::Unresponsive(_)) {
            warn!(job_id = %job.id, generation, "abandoning unresponsive pipeline");
            run.abort();
        }

        let resolution = resolve(outcome, handle.cancel_reason(), &self.retry, generation, &self.config);
        self.finish(&job.id, generation, resolution);
    }

    async fn supervise(
        &self,
        run: &mut JoinHandle<std::result::Result<PipelineOutput, PipelineError>>,
        handle: &ExecutionHandle,
    ) -> RunOutcome {
        let joined = |result: std::result::Result<_, tokio::task::JoinError>| match result {
            Ok(result) => RunOutcome::Finished(result),
            Err(e) => RunOutcome::Crashed(e.to_string()),
        };

        tokio::select! {
            result = &mut *run => return joined(result),
            () = handle.token.cancelled() => {}
            () = deadline(self.config.job_timeout) => {
                warn!(job_id = %handle.job_id, generation = handle.generation, "job timed out, cancelling");
                handle.request_cancel(CancelReason::Timeout);
            }
        }

        match tokio::time::timeout(self.config.cancel_grace, &mut *run).await {
            Ok(result) => joined(result),
            Err(_) => RunOutcome::Unresponsive(handle.cancel_reason().unwrap_or(CancelReason::Requested)),
        }
    }

    /// Applies the final transition of an execution and drops its handle.
    fn finish(self: &Arc<Self>, job_id: &JobId, generation: Generation, resolution: Resolution) {
        let fields = TransitionFields::for_generation(generation);
        let mut handles = self.handles();
        match resolution {
            Resolution::Complete(output) => {
                let result = self.store.complete(job_id, generation, &output, self.registrar.as_ref());
                handles.remove(job_id);
                drop(handles);
                match result {
                    Ok(CompletionOutcome::Completed { model, .. }) => {
                        info!(job_id = %job_id, model_id = %model.id, "job completed");
                        self.events.job_completed(job_id, &model.id);
                    }
                    Ok(CompletionOutcome::RegistrationFailed { reason, .. }) => {
                        error!(job_id = %job_id, error = %reason, "job failed");
                        self.events.job_failed(job_id, &reason, true);
                    }
                    Err(e) => warn!(job_id = %job_id, generation, error = %e, "could not complete job"),
                }
            }
            Resolution::Retry { delay, error } => {
                let result = self.store.transition(job_id, JobStatus::Pending, fields);
                handles.remove(job_id);
                drop(handles);
                match result {
                    Ok(_) => {
                        warn!(
                            job_id = %job_id,
                            attempt = generation,
                            delay_secs = delay.as_secs_f64(),
                            error = %error,
                            "transient failure, retrying"
                        );
                        self.events.job_retrying(job_id, generation, delay, &error);
                        self.schedule_retry(job_id.clone(), delay);
                    }
                    Err(e) => warn!(job_id = %job_id, generation, error = %e, "could not requeue job"),
                }
            }
            Resolution::Requeue => {
                let result = self.store.transition(job_id, JobStatus::Pending, fields);
                handles.remove(job_id);
                drop(handles);
                match result {
                    Ok(_) => {
                        info!(job_id = %job_id, attempt = generation, "job interrupted by shutdown, requeued");
                        self.queue.enqueue_front(job_id.clone());
                        self.events.job_requeued(job_id, self.queue.len());
                    }
                    Err(e) => warn!(job_id = %job_id, generation, error = %e, "could not requeue job"),
                }
            }
            Resolution::Fail(message) => {
                let result = self.store.transition(job_id, JobStatus::Failed, fields.with_error(message.clone()));
                handles.remove(job_id);
                drop(handles);
                match result {
                    Ok(_) => {
                        error!(job_id = %job_id, attempt = generation, error = %message, "job failed");
                        self.events.job_failed(job_id, &message, true);
                    }
                    Err(e) => warn!(job_id = %job_id, generation, error = %e, "could not fail job"),
                }
            }
            Resolution::Cancel { forced } => {
                let result = self.store.transition(job_id, JobStatus::Cancelled, fields);
                handles.remove(job_id);
                drop(handles);
                match result {
                    Ok(_) => {
                        info!(job_id = %job_id, forced, "job cancelled");
                        self.events.job_cancelled(job_id, true);
                    }
                    Err(e) => warn!(job_id = %job_id, generation, error = %e, "could not cancel job"),
                }
            }
        }
    }

    /// Puts a job back on the queue after `delay`, unless it stopped being
    /// pending in the meantime. The queue outlives `stop`, so a job whose
    /// backoff ends while the scheduler is stopped runs after the next `start`.
    fn schedule_retry(self: &Arc<Self>, job_id: JobId, delay: Duration) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match shared.store.get(&job_id) {
                Ok(job) if job.status == JobStatus::Pending => {
                    if shared.queue.enqueue(job_id.clone()) {
                        shared.events.job_queued(&job_id, shared.queue.len());
                    }
                }
                Ok(job) => debug!(job_id = %job_id, status = %job.status, "job left pending during backoff"),
                Err(e) => warn!(job_id = %job_id, error = %e, "could not requeue job"),
            }
        });
    }
}

/// Assembles a [`Scheduler`].
pub struct SchedulerBuilder {
    store: Arc<dyn JobStore>,
    pipeline: Arc<dyn TrainingPipeline>,
    registrar: Arc<dyn ModelRegistrar>,
    layout: TrainingLayout,
    retry: RetryPolicy,
    config: SchedulerConfig,
    events: Option<JobEventReporter>,
}

impl SchedulerBuilder {
    #[must_use]
    pub fn layout(mut self, layout: TrainingLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing event reporter instead of creating one.
    #[must_use]
    pub fn events(mut self, events: JobEventReporter) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn build(self) -> Scheduler {
        let events = self.events.unwrap_or_else(|| JobEventReporter::new(self.config.event_capacity));
        Scheduler {
            shared: Arc::new(Shared {
                store: self.store,
                pipeline: self.pipeline,
                registrar: self.registrar,
                layout: self.layout,
                retry: self.retry,
                config: self.config,
                events,
                queue: JobQueue::new(),
                slot: Arc::new(Semaphore::new(1)),
                handles: Mutex::new(HashMap::new()),
                shutdown: Mutex::new(CancellationToken::new()),
            }),
            dispatcher: Arc::new(Mutex::new(None)),
        }
    }
}

/// Job control API: submission, cancellation, status and the dispatch loop.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pipeline", &self.shared.pipeline.id())
            .field("queue_depth", &self.shared.queue.len())
            .field("running", &self.running_job())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn builder(
        store: Arc<dyn JobStore>,
        pipeline: Arc<dyn TrainingPipeline>,
        registrar: Arc<dyn ModelRegistrar>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            store,
            pipeline,
            registrar,
            layout: TrainingLayout::new("models"),
            retry: RetryPolicy::default(),
            config: SchedulerConfig::default(),
            events: None,
        }
    }

    fn dispatcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the dispatch loop. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut dispatcher = self.dispatcher();
        if dispatcher.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(OrchestrationError::Scheduler("scheduler is already running".to_string()));
        }
        let shutdown = {
            let mut token = self.shared.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
            token.clone()
        };
        *dispatcher = Some(tokio::spawn(Arc::clone(&self.shared).run_loop(shutdown)));
        Ok(())
    }

    /// Stops dispatching, interrupts the running job and waits for the slot
    /// to be released.
    ///
    /// The interrupted job goes back to `pending` at the head of the queue,
    /// unless its pipeline still finished with an artifact, in which case it
    /// completes. Queued jobs stay queued for the next `start`.
    pub async fn stop(&self) -> Result<()> {
        let Some(dispatcher) = self.dispatcher().take() else {
            return Err(OrchestrationError::Scheduler("scheduler is not running".to_string()));
        };
        self.shared.shutdown_token().cancel();
        if let Err(e) = dispatcher.await {
            error!(error = %e, "scheduler loop panicked");
        }
        // The loop is gone, so no job can enter `running` after this.
        for handle in self.shared.handles().values() {
            info!(job_id = %handle.job_id, "interrupting job for shutdown");
            handle.request_cancel(CancelReason::Shutdown);
        }
        let _permit = self
            .shared
            .slot
            .acquire()
            .await
            .map_err(|e| OrchestrationError::Scheduler(format!("execution slot closed: {e}")))?;
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.dispatcher().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Persists a new job and queues it. Never waits for the slot.
    pub fn submit(&self, spec: JobSpec) -> Result<JobId> {
        let job = self.shared.store.create(spec)?;
        self.shared.queue.enqueue(job.id.clone());
        self.shared.events.job_queued(&job.id, self.shared.queue.len());
        Ok(job.id)
    }

    /// Queues a job that already exists in the store.
    pub fn enqueue(&self, job_id: &JobId) -> Result<()> {
        let job = self.shared.store.get(job_id)?;
        match job.status {
            JobStatus::Pending => {
                if self.shared.queue.enqueue(job_id.clone()) {
                    self.shared.events.job_queued(job_id, self.shared.queue.len());
                }
                Ok(())
            }
            status if status.is_terminal() => Err(OrchestrationError::AlreadyTerminal { job_id: job_id.clone(), status }),
            status => Err(OrchestrationError::InvalidTransition { job_id: job_id.clone(), from: status, to: JobStatus::Running }),
        }
    }

    /// Cancels a job.
    ///
    /// A pending job is cancelled on the spot. A running job is signalled and
    /// becomes `cancelled` once its pipeline unwinds (or is abandoned after
    /// the grace period).
    pub fn cancel(&self, job_id: &JobId) -> Result<CancelOutcome> {
        let handles = self.shared.handles();
        let job = self.shared.store.get(job_id)?;
        match job.status {
            status if status.is_terminal() => {
                Err(OrchestrationError::AlreadyTerminal { job_id: job_id.clone(), status })
            }
            JobStatus::Pending => {
                self.shared.store.transition(job_id, JobStatus::Cancelled, TransitionFields::default())?;
                drop(handles);
                self.shared.queue.remove(job_id);
                info!(job_id = %job_id, "pending job cancelled");
                self.shared.events.job_cancelled(job_id, false);
                Ok(CancelOutcome::Cancelled)
            }
            _ => {
                if let Some(handle) = handles.get(job_id) {
                    info!(job_id = %job_id, generation = handle.generation, "cancellation requested");
                    handle.request_cancel(CancelReason::Requested);
                    return Ok(CancelOutcome::Requested);
                }
                // Running in the store but not here: its worker is gone.
                self.shared.store.transition(job_id, JobStatus::Cancelled, TransitionFields::default())?;
                drop(handles);
                info!(job_id = %job_id, "orphaned running job cancelled");
                self.shared.events.job_cancelled(job_id, false);
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    /// Re-queues work left behind by a previous process: every `pending` job,
    /// and every `running` job this scheduler is not executing (reset to
    /// `pending` first). Oldest jobs are queued first.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        {
            let handles = self.shared.handles();
            for job in self.shared.store.list_with_status(JobStatus::Running)? {
                if handles.contains_key(&job.id) {
                    continue;
                }
                self.shared.store.transition(&job.id, JobStatus::Pending, TransitionFields::default())?;
                warn!(job_id = %job.id, attempts = job.attempts, "recovered orphaned running job");
                report.orphaned += 1;
            }
        }

        for job in self.shared.store.list_with_status(JobStatus::Pending)? {
            if self.shared.queue.enqueue(job.id.clone()) {
                self.shared.events.job_queued(&job.id, self.shared.queue.len());
                report.requeued += 1;
            }
        }
        info!(requeued = report.requeued, orphaned = report.orphaned, "recovery finished");
        Ok(report)
    }

    /// Read-only view of a job.
    pub fn status(&self, job_id: &JobId) -> Result<Job> {
        self.shared.store.get(job_id)
    }

    /// Polls until the job is terminal or `timeout` elapses.
    pub async fn wait_for_terminal(&self, job_id: &JobId, timeout: Duration) -> Result<Job> {
        let mut events = self.shared.events.subscribe();
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.shared.store.get(job_id)?;
            if job.is_terminal() {
                return Ok(job);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(OrchestrationError::Scheduler(format!(
                    "timed out waiting for job {job_id} (status {})",
                    job.status
                )));
            }
            tokio::select! {
                _ = events.recv() => {}
                () = tokio::time::sleep(remaining.min(self.shared.config.poll_interval)) => {}
            }
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.shared.store
    }

    #[must_use]
    pub fn events(&self) -> &JobEventReporter {
        &self.shared.events
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// Ids of queued jobs in dispatch order.
    #[must_use]
    pub fn queued_jobs(&self) -> Vec<JobId> {
        self.shared.queue.snapshot()
    }

    /// The job currently holding the slot, if any.
    #[must_use]
    pub fn running_job(&self) -> Option<JobId> {
        self.shared.handles().keys().next().cloned()
    }

    /// Handle of the job's live execution, if it is running here.
    #[must_use]
    pub fn execution(&self, job_id: &JobId) -> Option<ExecutionHandle> {
        self.shared.handles().get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn output() -> PipelineOutput {
        PipelineOutput { artifact_path: PathBuf::from("/m/adapter"), metrics: Default::default() }
    }

    fn resolve_default(outcome: RunOutcome, requested: Option<CancelReason>, attempt: u32) -> Resolution {
        resolve(outcome, requested, &RetryPolicy::default(), attempt, &SchedulerConfig::default())
    }

    #[test]
    fn test_resolve_success() {
        let resolution = resolve_default(RunOutcome::Finished(Ok(output())), None, 1);
        assert_eq!(resolution, Resolution::Complete(output()));
    }

    #[test]
    fn test_resolve_cancel_wins_over_late_success() {
        let resolution = resolve_default(RunOutcome::Finished(Ok(output())), Some(CancelReason::Requested), 1);
        assert_eq!(resolution, Resolution::Cancel { forced: false });
    }

    #[test]
    fn test_resolve_transient_until_ceiling() {
        let err = || RunOutcome::Finished(Err(PipelineError::resource_exhausted("CUDA out of memory")));
        assert!(matches!(resolve_default(err(), None, 1), Resolution::Retry { delay, .. } if delay == Duration::from_secs(15)));
        assert!(matches!(resolve_default(err(), None, 2), Resolution::Retry { delay, .. } if delay == Duration::from_secs(30)));
        assert_eq!(resolve_default(err(), None, 3), Resolution::Fail("CUDA out of memory".to_string()));
    }

    #[test]
    fn test_resolve_fatal_keeps_message() {
        let resolution = resolve_default(RunOutcome::Finished(Err(PipelineError::failed("dataset is empty"))), None, 1);
        assert_eq!(resolution, Resolution::Fail("dataset is empty".to_string()));
    }

    #[test]
    fn test_resolve_unresponsive() {
        assert!(matches!(
            resolve_default(RunOutcome::Unresponsive(CancelReason::Timeout), Some(CancelReason::Timeout), 1),
            Resolution::Fail(message) if message.contains("time limit")
        ));
        assert_eq!(
            resolve_default(RunOutcome::Unresponsive(CancelReason::Requested), Some(CancelReason::Requested), 1),
            Resolution::Cancel { forced: true }
        );
        assert!(matches!(
            resolve_default(RunOutcome::Crashed("boom".to_string()), None, 1),
            Resolution::Fail(message) if message.contains("boom")
        ));
    }

    #[test]
    fn test_resolve_late_success_after_timeout_fails() {
        let config = SchedulerConfig { job_timeout: Some(Duration::from_secs(60)), ..SchedulerConfig::default() };
        let resolution =
            resolve(RunOutcome::Finished(Ok(output())), Some(CancelReason::Timeout), &RetryPolicy::default(), 1, &config);
        assert_eq!(resolution, Resolution::Fail("job exceeded its time limit of 60s".to_string()));

        let unwound = resolve(
            RunOutcome::Finished(Err(PipelineError::Cancelled)),
            Some(CancelReason::Timeout),
            &RetryPolicy::default(),
            1,
            &config,
        );
        assert_eq!(unwound, Resolution::Cancel { forced: false });
    }

    #[test]
    fn test_resolve_shutdown_requeues() {
        let shutdown = Some(CancelReason::Shutdown);
        assert_eq!(resolve_default(RunOutcome::Finished(Err(PipelineError::Cancelled)), shutdown, 1), Resolution::Requeue);
        assert_eq!(
            resolve_default(RunOutcome::Finished(Err(PipelineError::failed("interrupted"))), shutdown, 3),
            Resolution::Requeue
        );
        assert_eq!(resolve_default(RunOutcome::Unresponsive(CancelReason::Shutdown), shutdown, 1), Resolution::Requeue);
        // Finished work is kept.
        assert_eq!(resolve_default(RunOutcome::Finished(Ok(output())), shutdown, 1), Resolution::Complete(output()));
    }

    #[test]
    fn test_handle_keeps_first_reason() {
        let handle = ExecutionHandle::new(JobId::from("job"), 1);
        assert!(!handle.is_cancel_requested());
        handle.request_cancel(CancelReason::Timeout);
        handle.request_cancel(CancelReason::Requested);
        assert!(handle.is_cancel_requested());
        assert_eq!(handle.cancel_reason(), Some(CancelReason::Timeout));
    }
}
