//! Forge Orchestrator
//!
//! Runs training jobs one at a time on a single execution slot:
//! - Durable job records and their state machine (`JobStore`)
//! - FIFO dispatch with cooperative cancellation and per-job timeouts (`Scheduler`)
//! - Retry of transient failures with bounded backoff (`RetryPolicy`)
//! - Model registration on completion (`ModelRegistrar`, `ModelCatalog`)
//! - Lifecycle events for observers (`JobEventReporter`)

pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod registrar;
pub mod retention;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use config::{OrchestratorConfig, SchedulerConfig, StorageBackend, StorageConfig};
pub use error::{OrchestrationError, Result};
pub use events::{EventCounters, JobEvent, JobEventReporter};
pub use queue::JobQueue;
pub use registrar::{ModelCatalog, ModelRegistrar, RegistrationError};
pub use retention::{cleanup_artifacts, CleanupReport};
pub use retry::{FailureClass, RetryDecision, RetryPolicy};
pub use scheduler::{CancelOutcome, CancelReason, ExecutionHandle, RecoveryReport, Scheduler, SchedulerBuilder};
pub use sink::StoreProgressSink;
pub use store::{
    CompletionOutcome, Generation, InMemoryJobStore, JobStore, SqliteJobStore, TransitionFields, WriteOutcome,
};
