//! Removal of old training artifacts.

use crate::error::Result;
use crate::registrar::ModelCatalog;
use crate::store::JobStore;
use chrono::{Duration, Utc};
use forge_training::{JobId, TrainingLayout};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Jobs whose output directory was deleted.
    pub removed: Vec<JobId>,
    /// Jobs kept because their model is still active.
    pub kept_active: Vec<JobId>,
}

/// Deletes the output directories of terminal jobs that finished more than
/// `retention_days` ago, except those whose model is still active.
///
/// Job records are left in the store.
pub fn cleanup_artifacts(
    store: &dyn JobStore,
    catalog: &ModelCatalog,
    layout: &TrainingLayout,
    retention_days: u32,
) -> Result<CleanupReport> {
    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut report = CleanupReport::default();

    for job in store.terminal_before(cutoff)? {
        if catalog.has_active_model(&job.id) {
            report.kept_active.push(job.id);
            continue;
        }
        match layout.remove_job_dir(&job.spec.tenant_id, &job.id) {
            Ok(true) => {
                info!(job_id = %job.id, "removed expired training artifacts");
                report.removed.push(job.id);
            }
            Ok(false) => {}
            Err(e) => warn!(job_id = %job.id, error = %e, "failed to remove training artifacts"),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::ModelRegistrar;
    use crate::store::{InMemoryJobStore, TransitionFields};
    use forge_training::{DatasetRef, JobSpec, JobStatus, Metrics};
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_skips_active_models() {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::new(temp.path());
        let store = InMemoryJobStore::new();
        let catalog = ModelCatalog::new();

        let spec = || JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base");
        let cancelled = store.create(spec()).unwrap();
        let with_model = store.create(spec()).unwrap();
        let pending = store.create(spec()).unwrap();

        for job in [&cancelled, &with_model, &pending] {
            layout.ensure_job_dirs("ws", &job.id).unwrap();
        }
        store.transition(&cancelled.id, JobStatus::Cancelled, TransitionFields::default()).unwrap();
        store.transition(&with_model.id, JobStatus::Cancelled, TransitionFields::default()).unwrap();
        let job = store.get(&with_model.id).unwrap();
        catalog.register(&job, &layout.adapter_dir("ws", &job.id), &Metrics::new()).unwrap();

        // Retention of zero days: everything terminal is expired.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let report = cleanup_artifacts(&store, &catalog, &layout, 0).unwrap();

        assert_eq!(report.removed, vec![cancelled.id.clone()]);
        assert_eq!(report.kept_active, vec![with_model.id.clone()]);
        assert!(!layout.job_dir("ws", &cancelled.id).exists());
        assert!(layout.job_dir("ws", &with_model.id).exists());
        assert!(layout.job_dir("ws", &pending.id).exists());
    }

    #[test]
    fn test_cleanup_respects_retention_window() {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::new(temp.path());
        let store = InMemoryJobStore::new();
        let job = store.create(JobSpec::new("ws", DatasetRef::new("ds", "/d.jsonl"), "base")).unwrap();
        layout.ensure_job_dirs("ws", &job.id).unwrap();
        store.transition(&job.id, JobStatus::Cancelled, TransitionFields::default()).unwrap();

        let report = cleanup_artifacts(&store, &ModelCatalog::new(), &layout, 30).unwrap();
        assert!(report.removed.is_empty());
        assert!(layout.job_dir("ws", &job.id).exists());
    }
}
