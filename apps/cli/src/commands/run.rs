//! `forge run`: an in-process scheduler over the simulated pipeline.

use super::render;
use super::types::RunArgs;
use crate::context;
use anyhow::{Context, Result};
use colored::Colorize;
use forge_orchestrator::{CancelOutcome, OrchestratorConfig, Scheduler};
use forge_training::{DatasetRef, Hyperparameters, Job, JobId, JobSpec, SimulatedPipeline};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// How often the store is re-read in case events were missed.
const RECONCILE_INTERVAL: Duration = Duration::from_millis(500);

fn job_spec(args: &RunArgs, index: usize) -> JobSpec {
    let hyperparameters = Hyperparameters {
        num_epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        max_steps: args.max_steps,
        ..Hyperparameters::default()
    };
    let spec = JobSpec::new(&args.tenant, DatasetRef::new(&args.dataset, &args.dataset_path), &args.base_model)
        .with_hyperparameters(hyperparameters);
    match (&args.name, args.jobs) {
        (Some(name), 1) => spec.with_name(name),
        (Some(name), _) => spec.with_name(format!("{name}-{}", index + 1)),
        (None, _) => spec,
    }
}

pub async fn execute(config: &OrchestratorConfig, args: &RunArgs) -> Result<()> {
    let store = context::open_store(&config.storage)?;
    let catalog = Arc::new(context::open_catalog(&config.storage)?);
    let pipeline = SimulatedPipeline::new(Duration::from_millis(args.step_delay_ms))
        .with_sample_count(args.samples)
        .with_transient_failures(args.transient_failures);

    let scheduler = Scheduler::builder(store, Arc::new(pipeline), catalog)
        .layout(context::layout(&config.storage))
        .retry_policy(config.retry.clone())
        .config(config.scheduler.clone())
        .build();
    let mut events = scheduler.events().subscribe();

    let recovery = scheduler.recover().context("Failed to recover pending jobs")?;
    if !args.json && (recovery.requeued > 0 || recovery.orphaned > 0) {
        println!(
            "{} {} pending job(s) from a previous run ({} interrupted)",
            "Recovered".yellow(),
            recovery.requeued,
            recovery.orphaned
        );
    }

    let mut submitted = Vec::with_capacity(args.jobs);
    for index in 0..args.jobs {
        let job_id = scheduler.submit(job_spec(args, index)).context("Failed to submit job")?;
        if !args.json {
            println!("{} {}", "Submitted".bold(), job_id.to_string().cyan());
        }
        submitted.push(job_id);
    }
    scheduler.start()?;

    if let (Some(ms), Some(target)) = (args.cancel_after_ms, submitted.first().cloned()) {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            match scheduler.cancel(&target) {
                Ok(CancelOutcome::Cancelled) => debug!(job_id = %target, "cancelled pending job"),
                Ok(CancelOutcome::Requested) => debug!(job_id = %target, "cancellation requested"),
                Err(e) => warn!(job_id = %target, error = %e, "cancel failed"),
            }
        });
    }

    let mut remaining: HashSet<JobId> = submitted.iter().cloned().collect();
    let mut reconcile = tokio::time::interval(RECONCILE_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !remaining.is_empty() {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if remaining.contains(event.job_id()) {
                        if !args.json {
                            if let Some(line) = render::describe_event(&event) {
                                println!("{line}");
                            }
                        }
                        if event.is_terminal() {
                            remaining.remove(event.job_id());
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = reconcile.tick() => {
                remaining.retain(|id| scheduler.status(id).is_ok_and(|job| !job.is_terminal()));
            }
            _ = &mut ctrl_c => {
                if !args.json {
                    println!("{}", "Interrupted, stopping scheduler...".yellow());
                }
                break;
            }
        }
    }

    scheduler.stop().await?;

    let jobs: Vec<Job> = submitted.iter().map(|id| scheduler.status(id)).collect::<Result<_, _>>()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    println!();
    println!("{}", "Summary".bold().cyan());
    render::print_job_table(&jobs);
    let counters = scheduler.events().snapshot();
    println!();
    println!(
        "  {} completed, {} failed, {} cancelled, {} retried",
        counters.completed.to_string().green(),
        counters.failed.to_string().red(),
        counters.cancelled.to_string().yellow(),
        counters.retried
    );
    for job in &jobs {
        if let Some(model_id) = &job.model_id {
            println!("  Model {} ← job {}", model_id.as_str().green(), job.id.as_str().dimmed());
        }
    }
    Ok(())
}
