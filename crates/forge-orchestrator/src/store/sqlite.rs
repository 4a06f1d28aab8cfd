//! SQLite-backed job store.
//!
//! Queryable fields live in their own columns; the full job record is kept as
//! JSON next to them. Every mutation is a read-modify-write inside an
//! immediate transaction, so concurrent writers (threads or processes) are
//! serialized per database.

use super::{CompletionOutcome, Generation, JobStore, StoredJob, TransitionFields, WriteOutcome};
use crate::error::{OrchestrationError, Result};
use crate::registrar::ModelRegistrar;
use chrono::{DateTime, SecondsFormat, Utc};
use forge_training::{Job, JobId, JobSpec, JobStatus, Metrics, PipelineOutput, ProgressUpdate};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn load(conn: &Connection, id: &JobId) -> Result<StoredJob> {
    let row = conn
        .query_row(
            "SELECT job_json, active_generation FROM training_jobs WHERE id = ?1",
            params![id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<u32>>(1)?)),
        )
        .optional()?;
    let (json, active) = row.ok_or_else(|| OrchestrationError::NotFound(id.clone()))?;
    Ok(StoredJob { job: serde_json::from_str(&json)?, active })
}

fn save(conn: &Connection, stored: &StoredJob) -> Result<()> {
    let job = &stored.job;
    conn.execute(
        r#"
        UPDATE training_jobs
        SET status = ?2, active_generation = ?3, completed_at = ?4, job_json = ?5
        WHERE id = ?1
        "#,
        params![
            job.id.as_str(),
            job.status.as_str(),
            stored.active,
            job.completed_at.map(timestamp),
            serde_json::to_string(job)?,
        ],
    )?;
    Ok(())
}

fn decode_all(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
    let mut jobs = Vec::new();
    for json in rows {
        jobs.push(serde_json::from_str(&json?)?);
    }
    Ok(jobs)
}

impl SqliteJobStore {
    /// Wraps a shared connection and makes sure the schema exists.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens (or creates) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        info!(path = %path.display(), "opened job database");
        Self::new(Arc::new(Mutex::new(conn)))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Arc::new(Mutex::new(Connection::open_in_memory()?)))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS training_jobs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                active_generation INTEGER,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                job_json TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_training_jobs_tenant ON training_jobs(tenant_id)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_training_jobs_status ON training_jobs(status)", [])?;
        Ok(())
    }

    fn mutate<T>(&self, id: &JobId, f: impl FnOnce(&mut StoredJob) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored = load(&tx, id)?;
        let value = f(&mut stored)?;
        save(&tx, &stored)?;
        tx.commit()?;
        Ok(value)
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, spec: JobSpec) -> Result<Job> {
        spec.validate()?;
        let job = Job::new(spec);
        self.lock().execute(
            r#"
            INSERT INTO training_jobs (id, tenant_id, status, active_generation, created_at, completed_at, job_json)
            VALUES (?1, ?2, ?3, NULL, ?4, NULL, ?5)
            "#,
            params![
                job.id.as_str(),
                job.spec.tenant_id,
                job.status.as_str(),
                timestamp(job.created_at),
                serde_json::to_string(&job)?,
            ],
        )?;
        info!(job_id = %job.id, tenant_id = %job.spec.tenant_id, "job created");
        Ok(job)
    }

    fn get(&self, id: &JobId) -> Result<Job> {
        Ok(load(&self.lock(), id)?.job)
    }

    fn list(&self) -> Result<Vec<Job>> {
        decode_all(&self.lock(), "SELECT job_json FROM training_jobs ORDER BY created_at DESC, id DESC", [])
    }

    fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Job>> {
        decode_all(
            &self.lock(),
            "SELECT job_json FROM training_jobs WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC",
            params![tenant_id],
        )
    }

    fn list_with_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        decode_all(
            &self.lock(),
            "SELECT job_json FROM training_jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            params![status.as_str()],
        )
    }

    fn terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        decode_all(
            &self.lock(),
            r#"
            SELECT job_json FROM training_jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
                AND completed_at IS NOT NULL
                AND completed_at < ?1
            ORDER BY completed_at ASC
            "#,
            params![timestamp(cutoff)],
        )
    }

    fn active_generation(&self, id: &JobId) -> Result<Option<Generation>> {
        Ok(load(&self.lock(), id)?.active)
    }

    fn transition(&self, id: &JobId, to: JobStatus, fields: TransitionFields) -> Result<Job> {
        self.mutate(id, |stored| {
            stored.transition(to, fields, Utc::now())?;
            Ok(stored.job.clone())
        })
    }

    fn record_progress(&self, id: &JobId, generation: Generation, update: &ProgressUpdate) -> Result<WriteOutcome> {
        self.mutate(id, |stored| Ok(stored.record_progress(generation, update)))
    }

    fn append_metrics(&self, id: &JobId, generation: Generation, metrics: &Metrics) -> Result<WriteOutcome> {
        self.mutate(id, |stored| Ok(stored.append_metrics(generation, metrics)))
    }

    fn complete(
        &self,
        id: &JobId,
        generation: Generation,
        output: &PipelineOutput,
        registrar: &dyn ModelRegistrar,
    ) -> Result<CompletionOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored = load(&tx, id)?;
        let outcome = stored.complete(generation, output, registrar, Utc::now())?;

        let persisted = save(&tx, &stored).and_then(|()| tx.commit().map_err(OrchestrationError::from));
        if let Err(e) = persisted {
            if let CompletionOutcome::Completed { model, .. } = &outcome {
                error!(job_id = %id, model_id = %model.id, error = %e, "rolling back model registration");
                registrar.rollback(&model.id);
            }
            return Err(e);
        }
        Ok(outcome)
    }
}
