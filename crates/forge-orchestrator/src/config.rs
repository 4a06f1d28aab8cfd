//! Orchestrator configuration.
//!
//! Loaded from TOML. Every field has a default, so a config file only needs
//! the values it changes:
//!
//! ```toml
//! [scheduler]
//! job_timeout = 28800     # seconds, 0 disables
//! cancel_grace = 30
//!
//! [retry]
//! max_attempts = 3
//! base_backoff = 15
//! max_backoff = 60
//!
//! [storage]
//! backend = "sqlite"
//! database_path = "/var/lib/forge/jobs.db"
//! models_dir = "/var/lib/forge/models"
//! ```

use crate::error::{OrchestrationError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serde helper: `Duration` as (fractional) seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serde helper: optional `Duration` as seconds, where `0` means none.
pub mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.map_or(0.0, |d| d.as_secs_f64()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if secs <= 0.0 {
            return Ok(None);
        }
        Duration::try_from_secs_f64(secs).map(Some).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock limit per attempt.
    #[serde(with = "option_duration_secs")]
    pub job_timeout: Option<Duration>,
    /// How long a cancelled or timed-out pipeline gets to unwind.
    #[serde(with = "duration_secs")]
    pub cancel_grace: Duration,
    /// The dispatch loop re-checks the queue at least this often.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Buffer size of the job event channel.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Some(Duration::from_secs(8 * 60 * 60)),
            cancel_grace: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: PathBuf,
    /// Root of the `workspace_<tenant>/job_<id>/adapter` tree.
    pub models_dir: PathBuf,
    /// Terminal jobs older than this lose their artifacts.
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = forge_home();
        Self {
            backend: StorageBackend::Sqlite,
            database_path: home.join("jobs.db"),
            models_dir: home.join("models"),
            retention_days: 30,
        }
    }
}

impl StorageConfig {
    /// Where the model catalog is mirrored.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.models_dir.join("catalog.json")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryPolicy,
    pub storage: StorageConfig,
}

fn forge_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".")).join(".forge")
}

/// Overlays `overlay` onto `base`, recursing into tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => merge_tables(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| OrchestrationError::Config(format!("{}: {e}", path.display())))?;
    content.parse::<toml::Table>().map_err(|e| OrchestrationError::Config(format!("{}: {e}", path.display())))
}

impl OrchestratorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OrchestrationError::Config(format!("configuration file not found: {}", path.display())));
        }
        let config: Self = toml::Value::Table(read_table(path)?)
            .try_into()
            .map_err(|e| OrchestrationError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| OrchestrationError::Config(format!("failed to serialize: {e}")))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn default_global_path() -> PathBuf {
        forge_home().join("config.toml")
    }

    #[must_use]
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".forgerc")
    }

    /// Layers the global config and then the local one over the defaults.
    ///
    /// Missing files are skipped; a file that exists but does not parse is
    /// an error.
    pub fn discover_and_load() -> Result<Self> {
        Self::load_layered(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Layers `paths` in order; later files win per key.
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths.iter().filter(|p| p.exists()) {
            merge_tables(&mut merged, read_table(path)?);
        }
        let config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| OrchestrationError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(OrchestrationError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.base_backoff > self.retry.max_backoff {
            return Err(OrchestrationError::Config("retry.base_backoff exceeds retry.max_backoff".to_string()));
        }
        if self.scheduler.poll_interval.is_zero() {
            return Err(OrchestrationError::Config("scheduler.poll_interval must be positive".to_string()));
        }
        if self.scheduler.event_capacity == 0 {
            return Err(OrchestrationError::Config("scheduler.event_capacity must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_backoff, Duration::from_secs(15));
        assert_eq!(config.scheduler.job_timeout, Some(Duration::from_secs(28_800)));
        assert_eq!(config.storage.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[scheduler]
job_timeout = 0
cancel_grace = 2.5

[retry]
max_attempts = 5
transient_patterns = ["CUDA out of memory", "NCCL timeout"]

[storage]
backend = "memory"
models_dir = "/tmp/forge-models"
"#,
        )
        .unwrap();

        let config = OrchestratorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.scheduler.job_timeout, None);
        assert_eq!(config.scheduler.cancel_grace, Duration::from_millis(2500));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.transient_patterns.len(), 2);
        assert_eq!(config.retry.max_backoff, Duration::from_secs(60));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.models_dir, PathBuf::from("/tmp/forge-models"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = OrchestratorConfig::load_from_file(Path::new("/nonexistent/forge.toml")).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = OrchestratorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layered_local_wins() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let local = temp.path().join("local.toml");
        std::fs::write(&global, "[retry]\nmax_attempts = 4\nbase_backoff = 5\n").unwrap();
        std::fs::write(&local, "[retry]\nmax_attempts = 2\n").unwrap();

        let config = OrchestratorConfig::load_layered(&[global, local, temp.path().join("missing.toml")]).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let mut config = OrchestratorConfig::default();
        config.scheduler.job_timeout = None;
        config.storage.backend = StorageBackend::Memory;

        config.save_to_file(&path).unwrap();
        let loaded = OrchestratorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
