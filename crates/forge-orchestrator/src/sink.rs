use crate::events::JobEventReporter;
use crate::store::{Generation, JobStore, WriteOutcome};
use forge_training::{JobId, ProgressSink, ProgressUpdate};
use std::sync::Arc;
use tracing::{debug, warn};

/// Progress sink bound to one execution of one job.
///
/// Writes go through the store with the execution's generation, so reports
/// that arrive after the execution was superseded or finished are dropped
/// instead of overwriting newer state.
pub struct StoreProgressSink {
    store: Arc<dyn JobStore>,
    events: JobEventReporter,
    job_id: JobId,
    generation: Generation,
}

impl StoreProgressSink {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, events: JobEventReporter, job_id: JobId, generation: Generation) -> Self {
        Self { store, events, job_id, generation }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl ProgressSink for StoreProgressSink {
    fn report(&self, update: ProgressUpdate) {
        match self.store.record_progress(&self.job_id, self.generation, &update) {
            Ok(WriteOutcome::Applied) => {
                debug!(
                    job_id = %self.job_id,
                    generation = self.generation,
                    progress = update.progress,
                    stage = ?update.stage,
                    "progress recorded"
                );
                self.events.job_progress(&self.job_id, &update);
            }
            Ok(WriteOutcome::Dropped) => {}
            Err(e) => warn!(job_id = %self.job_id, error = %e, "failed to record progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryJobStore, TransitionFields};
    use forge_training::{DatasetRef, JobSpec, JobStatus, PipelineStage};

    #[test]
    fn test_sink_drops_reports_from_old_generation() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let events = JobEventReporter::new(16);
        let job = store.create(JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base")).unwrap();

        store.transition(&job.id, JobStatus::Running, TransitionFields::default()).unwrap();
        let first = StoreProgressSink::new(store.clone(), events.clone(), job.id.clone(), 1);
        first.report(ProgressUpdate::stage(PipelineStage::DatasetReady));
        assert!((store.get(&job.id).unwrap().progress - 10.0).abs() < f64::EPSILON);

        store.transition(&job.id, JobStatus::Pending, TransitionFields::for_generation(1)).unwrap();
        store.transition(&job.id, JobStatus::Running, TransitionFields::default()).unwrap();
        let second = StoreProgressSink::new(store.clone(), events, job.id.clone(), 2);

        first.report(ProgressUpdate::stage(PipelineStage::Saving));
        assert!((store.get(&job.id).unwrap().progress - 0.0).abs() < f64::EPSILON);

        second.report(ProgressUpdate::stage(PipelineStage::LoadingDataset));
        assert!((store.get(&job.id).unwrap().progress - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sink_publishes_applied_progress() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let events = JobEventReporter::new(16);
        let mut rx = events.subscribe();
        let job = store.create(JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base")).unwrap();
        let sink = StoreProgressSink::new(store.clone(), events, job.id.clone(), 1);

        // Not running yet: dropped, nothing published.
        sink.report(ProgressUpdate::new(50.0));
        assert!(rx.try_recv().is_err());

        store.transition(&job.id, JobStatus::Running, TransitionFields::default()).unwrap();
        sink.report(ProgressUpdate::new(50.0));
        assert!(rx.try_recv().is_ok());
    }
}
