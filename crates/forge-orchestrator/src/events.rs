//! Job lifecycle events.
//!
//! Observers (the CLI, tests) subscribe to a broadcast channel. Sending never
//! blocks the scheduler; slow receivers lag and skip events.

use forge_training::{JobId, ModelId, PipelineStage, ProgressUpdate};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    JobQueued {
        job_id: JobId,
        queue_depth: usize,
    },
    JobStarted {
        job_id: JobId,
        /// Generation (attempt number) of this execution.
        generation: u32,
    },
    JobProgress {
        job_id: JobId,
        progress: f64,
        stage: Option<PipelineStage>,
        step: Option<u64>,
    },
    /// A transient failure; the job goes back to the queue after `delay`.
    JobRetrying {
        job_id: JobId,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    JobCompleted {
        job_id: JobId,
        model_id: ModelId,
    },
    ModelRegistered {
        model_id: ModelId,
        job_id: JobId,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
    JobCancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::JobQueued { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobRetrying { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::ModelRegistered { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id } => job_id,
        }
    }

    /// Whether this event ends the job's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobCompleted { .. } | Self::JobFailed { .. } | Self::JobCancelled { .. })
    }
}

/// Counters over everything the reporter has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCounters {
    pub queue_depth: usize,
    pub running: usize,
    pub started: usize,
    pub retried: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone)]
pub struct JobEventReporter {
    tx: broadcast::Sender<JobEvent>,
    counters: Arc<Mutex<EventCounters>>,
}

impl Default for JobEventReporter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl JobEventReporter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, counters: Arc::new(Mutex::new(EventCounters::default())) }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> EventCounters {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut EventCounters)) {
        f(&mut self.counters.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn emit(&self, event: JobEvent) {
        debug!(?event, "job event");
        let _ = self.tx.send(event);
    }

    pub fn job_queued(&self, job_id: &JobId, queue_depth: usize) {
        self.update(|c| c.queue_depth = queue_depth);
        self.emit(JobEvent::JobQueued { job_id: job_id.clone(), queue_depth });
    }

    pub fn job_started(&self, job_id: &JobId, generation: u32, queue_depth: usize) {
        self.update(|c| {
            c.queue_depth = queue_depth;
            c.running += 1;
            c.started += 1;
        });
        self.emit(JobEvent::JobStarted { job_id: job_id.clone(), generation });
    }

    /// A running job went back to the queue without failing.
    pub fn job_requeued(&self, job_id: &JobId, queue_depth: usize) {
        self.update(|c| {
            c.queue_depth = queue_depth;
            c.running = c.running.saturating_sub(1);
        });
        self.emit(JobEvent::JobQueued { job_id: job_id.clone(), queue_depth });
    }

    pub fn job_progress(&self, job_id: &JobId, update: &ProgressUpdate) {
        self.emit(JobEvent::JobProgress {
            job_id: job_id.clone(),
            progress: update.progress,
            stage: update.stage,
            step: update.step,
        });
    }

    pub fn job_retrying(&self, job_id: &JobId, attempt: u32, delay: Duration, error: &str) {
        self.update(|c| {
            c.running = c.running.saturating_sub(1);
            c.retried += 1;
        });
        self.emit(JobEvent::JobRetrying { job_id: job_id.clone(), attempt, delay, error: error.to_string() });
    }

    pub fn job_completed(&self, job_id: &JobId, model_id: &ModelId) {
        self.update(|c| {
            c.running = c.running.saturating_sub(1);
            c.completed += 1;
        });
        self.emit(JobEvent::ModelRegistered { model_id: model_id.clone(), job_id: job_id.clone() });
        self.emit(JobEvent::JobCompleted { job_id: job_id.clone(), model_id: model_id.clone() });
    }

    /// `was_running` is false when the job failed before it ever started.
    pub fn job_failed(&self, job_id: &JobId, error: &str, was_running: bool) {
        self.update(|c| {
            if was_running {
                c.running = c.running.saturating_sub(1);
            }
            c.failed += 1;
        });
        self.emit(JobEvent::JobFailed { job_id: job_id.clone(), error: error.to_string() });
    }

    pub fn job_cancelled(&self, job_id: &JobId, was_running: bool) {
        self.update(|c| {
            if was_running {
                c.running = c.running.saturating_sub(1);
            }
            c.cancelled += 1;
        });
        self.emit(JobEvent::JobCancelled { job_id: job_id.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let reporter = JobEventReporter::new(16);
        let mut rx = reporter.subscribe();
        let job_id = JobId::from("job-1");

        reporter.job_queued(&job_id, 1);
        reporter.job_started(&job_id, 1, 0);
        reporter.job_completed(&job_id, &ModelId::for_job(&job_id));

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::JobQueued { queue_depth: 1, .. }));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::JobStarted { generation: 1, .. }));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::ModelRegistered { .. }));
        let last = rx.recv().await.unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.job_id(), &job_id);
    }

    #[test]
    fn test_counters() {
        let reporter = JobEventReporter::new(4);
        let job_id = JobId::from("job-1");

        reporter.job_started(&job_id, 1, 0);
        reporter.job_retrying(&job_id, 1, Duration::from_secs(15), "CUDA out of memory");
        reporter.job_started(&job_id, 2, 0);
        reporter.job_failed(&job_id, "boom", true);
        reporter.job_cancelled(&JobId::from("job-2"), false);

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.started, 2);
        assert_eq!(snapshot.retried, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.running, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_still_delivers() {
        let reporter = JobEventReporter::new(0);
        let mut rx = reporter.subscribe();
        let job_id = JobId::from("job-1");

        reporter.job_started(&job_id, 1, 0);
        reporter.job_requeued(&job_id, 1);

        // One slot: the requeue overwrites the start.
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(1))));
        assert!(matches!(rx.recv().await.unwrap(), JobEvent::JobQueued { queue_depth: 1, .. }));
        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.running, 0);
        assert_eq!(snapshot.queue_depth, 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let reporter = JobEventReporter::default();
        reporter.job_queued(&JobId::from("job-1"), 3);
        assert_eq!(reporter.snapshot().queue_depth, 3);
    }
}
