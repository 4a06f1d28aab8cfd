use crate::error::TrainingResult;
use crate::job::JobId;
use std::path::{Path, PathBuf};

/// Filesystem layout for training outputs.
///
/// Default layout is `<models_dir>/workspace_<tenant>/job_<job_id>/adapter`.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    root: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        self.root.join(format!("workspace_{tenant_id}"))
    }

    #[must_use]
    pub fn job_dir(&self, tenant_id: &str, job_id: &JobId) -> PathBuf {
        self.tenant_dir(tenant_id).join(format!("job_{}", job_id.as_str()))
    }

    #[must_use]
    pub fn adapter_dir(&self, tenant_id: &str, job_id: &JobId) -> PathBuf {
        self.job_dir(tenant_id, job_id).join("adapter")
    }

    pub fn ensure_job_dirs(&self, tenant_id: &str, job_id: &JobId) -> TrainingResult<PathBuf> {
        let adapter = self.adapter_dir(tenant_id, job_id);
        std::fs::create_dir_all(&adapter)?;
        Ok(adapter)
    }

    /// Removes a job's output directory. Returns `false` when there was nothing to remove.
    pub fn remove_job_dir(&self, tenant_id: &str, job_id: &JobId) -> TrainingResult<bool> {
        let dir = self.job_dir(tenant_id, job_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::new(temp.path());
        let id = JobId::from("job-1");

        assert!(layout.job_dir("7", &id).ends_with("workspace_7/job_job-1"));
        assert!(layout.adapter_dir("7", &id).ends_with("workspace_7/job_job-1/adapter"));
    }

    #[test]
    fn test_ensure_and_remove_job_dirs() {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::new(temp.path());
        let id = JobId::from("job-2");

        let adapter = layout.ensure_job_dirs("7", &id).unwrap();
        assert!(adapter.is_dir());
        assert!(layout.remove_job_dir("7", &id).unwrap());
        assert!(!layout.remove_job_dir("7", &id).unwrap());
    }
}
