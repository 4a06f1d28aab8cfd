//! `forge list` and `forge status`.

use super::render;
use crate::context;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use forge_orchestrator::{JobStore, OrchestrationError, OrchestratorConfig};
use forge_training::{Job, JobId, JobStatus};

pub fn list(config: &OrchestratorConfig, tenant: Option<&str>, status: Option<&str>, json_output: bool) -> Result<()> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    let store = context::open_store(&config.storage)?;
    context::warn_if_ephemeral(&config.storage, json_output);

    let mut jobs = match tenant {
        Some(tenant) => store.list_by_tenant(tenant)?,
        None => store.list()?,
    };
    if let Some(status) = status {
        jobs.retain(|job| job.status == status);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("{}", "No training jobs found.".yellow());
        println!("{}", "Tip: submit one with `forge run`".dimmed());
        return Ok(());
    }

    println!("{}", format!("Training Jobs ({})", jobs.len()).bold().cyan());
    println!();
    render::print_job_table(&jobs);
    Ok(())
}

pub fn status(config: &OrchestratorConfig, job_id: &str, json_output: bool) -> Result<()> {
    let store = context::open_store(&config.storage)?;
    context::warn_if_ephemeral(&config.storage, json_output);
    let job = find_job(store.as_ref(), job_id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        render::print_job_detail(&job);
    }
    Ok(())
}

/// Looks a job up by full ID, falling back to a unique ID prefix.
fn find_job(store: &dyn JobStore, id: &str) -> Result<Job> {
    match store.get(&JobId(id.to_string())) {
        Ok(job) => return Ok(job),
        Err(OrchestrationError::NotFound(_)) => {}
        Err(e) => return Err(e).context("Failed to read job"),
    }

    let mut matches: Vec<Job> = store.list()?.into_iter().filter(|job| job.id.as_str().starts_with(id)).collect();
    match matches.len() {
        0 => bail!("Job not found: {id}"),
        1 => Ok(matches.remove(0)),
        n => bail!("Job ID prefix {id} is ambiguous ({n} matches)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_orchestrator::InMemoryJobStore;
    use forge_training::{DatasetRef, JobSpec};

    fn spec() -> JobSpec {
        JobSpec::new("ws", DatasetRef::new("ds", "/data/ds.jsonl"), "base")
    }

    #[test]
    fn test_find_job_by_prefix() {
        let store = InMemoryJobStore::new();
        let job = store.create(spec()).unwrap();

        assert_eq!(find_job(&store, job.id.as_str()).unwrap().id, job.id);
        assert_eq!(find_job(&store, &job.id.as_str()[..8]).unwrap().id, job.id);
        assert!(find_job(&store, "no-such-job").is_err());
    }

    #[test]
    fn test_find_job_rejects_ambiguous_prefix() {
        let store = InMemoryJobStore::new();
        store.create(spec()).unwrap();
        store.create(spec()).unwrap();

        assert!(find_job(&store, "").unwrap_err().to_string().contains("ambiguous"));
    }
}
