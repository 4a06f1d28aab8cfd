//! Terminal formatting for jobs, models and events.

use colored::{ColoredString, Colorize};
use forge_orchestrator::JobEvent;
use forge_training::{Job, JobStatus, Metrics, Model};

pub fn status_colored(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Pending => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
        JobStatus::Cancelled => status.as_str().dimmed(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn print_job_table(jobs: &[Job]) {
    println!("{:<38} {:<14} {:<11} {:>8} {:>8}  {}", "ID", "TENANT", "STATUS", "PROGRESS", "ATTEMPT", "NAME");
    println!("{}", "─".repeat(100));
    for job in jobs {
        println!(
            "{:<38} {:<14} {:<11} {:>7.1}% {:>8}  {}",
            job.id.as_str(),
            job.spec.tenant_id,
            status_colored(job.status),
            job.progress,
            job.attempts,
            job.spec.name
        );
    }
}

pub fn print_job_detail(job: &Job) {
    println!("{}", format!("Job {}", job.id).bold().cyan());
    println!("{}", "─".repeat(60));
    println!("  Name:        {}", job.spec.name);
    println!("  Tenant:      {}", job.spec.tenant_id);
    println!("  Status:      {}", status_colored(job.status));
    println!("  Base model:  {}", job.spec.base_model);
    println!("  Dataset:     {} ({})", job.spec.dataset.id, job.spec.dataset.path.display());
    match (job.current_step, job.total_steps) {
        (Some(step), Some(total)) => println!("  Progress:    {:.1}% (step {step}/{total})", job.progress),
        _ => println!("  Progress:    {:.1}%", job.progress),
    }
    println!("  Attempts:    {}", job.attempts);
    println!("  Created:     {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(completed) = job.completed_at {
        println!("  Finished:    {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(model_id) = &job.model_id {
        println!("  Model:       {}", model_id.as_str().green());
    }
    if let Some(error) = &job.error_message {
        println!("  Error:       {}", error.red());
    }
    print_metrics(&job.metrics);
}

pub fn print_model_table(models: &[Model]) {
    println!("{:<44} {:<14} {:<8} {:<26}  {}", "ID", "TENANT", "ACTIVE", "BASE MODEL", "NAME");
    println!("{}", "─".repeat(110));
    for model in models {
        let active = if model.is_active { "yes".green() } else { "no".dimmed() };
        println!(
            "{:<44} {:<14} {:<8} {:<26}  {}",
            model.id.as_str(),
            model.tenant_id,
            active,
            model.base_model,
            model.name
        );
    }
}

pub fn print_model_detail(model: &Model) {
    println!("{}", format!("Model {}", model.id).bold().cyan());
    println!("{}", "─".repeat(60));
    println!("  Name:        {}", model.name);
    println!("  Tenant:      {}", model.tenant_id);
    println!("  Base model:  {}", model.base_model);
    if let Some(job_id) = &model.job_id {
        println!("  Job:         {job_id}");
    }
    println!("  Artifacts:   {}", model.artifact_path.display());
    println!("  Active:      {}", if model.is_active { "yes".green() } else { "no".dimmed() });
    println!("  Registered:  {}", model.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print_metrics(&model.metrics);
}

fn print_metrics(metrics: &Metrics) {
    if metrics.is_empty() {
        return;
    }
    println!("  Metrics:");
    for (name, value) in metrics {
        println!("    {:<20} {value:.4}", name.dimmed());
    }
}

/// One line per interesting event. Step-level progress is thinned out.
pub fn describe_event(event: &JobEvent) -> Option<String> {
    let tag = format!("[{}]", short_id(event.job_id().as_str())).dimmed();
    let line = match event {
        JobEvent::JobQueued { queue_depth, .. } => format!("{tag} queued (depth {queue_depth})"),
        JobEvent::JobStarted { generation, .. } => {
            format!("{tag} {} attempt {generation}", "started".cyan())
        }
        JobEvent::JobProgress { progress, stage: Some(stage), .. } => {
            format!("{tag} {stage} {progress:.1}%")
        }
        JobEvent::JobProgress { progress, step: Some(step), .. } if step % 10 == 0 => {
            format!("{tag} step {step} {progress:.1}%")
        }
        JobEvent::JobProgress { .. } => return None,
        JobEvent::JobRetrying { attempt, delay, error, .. } => format!(
            "{tag} {} after attempt {attempt} in {:.1}s: {}",
            "retrying".yellow(),
            delay.as_secs_f64(),
            error.dimmed()
        ),
        JobEvent::ModelRegistered { model_id, .. } => format!("{tag} registered model {}", model_id.as_str().green()),
        JobEvent::JobCompleted { .. } => format!("{tag} {}", "completed".green().bold()),
        JobEvent::JobFailed { error, .. } => format!("{tag} {}: {error}", "failed".red().bold()),
        JobEvent::JobCancelled { .. } => format!("{tag} {}", "cancelled".yellow().bold()),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_training::{JobId, PipelineStage};

    fn progress(step: Option<u64>, stage: Option<PipelineStage>) -> JobEvent {
        JobEvent::JobProgress { job_id: JobId("0123456789abcdef".to_string()), progress: 40.0, stage, step }
    }

    #[test]
    fn test_describe_event_thins_steps() {
        assert!(describe_event(&progress(Some(3), None)).is_none());
        assert!(describe_event(&progress(Some(10), None)).unwrap().contains("step 10"));
        assert!(describe_event(&progress(None, Some(PipelineStage::Training))).unwrap().contains("training"));
    }

    #[test]
    fn test_describe_event_uses_short_id() {
        colored::control::set_override(false);
        let line = describe_event(&JobEvent::JobCancelled { job_id: JobId("0123456789abcdef".to_string()) }).unwrap();
        assert_eq!(line, "[01234567] cancelled");
    }
}
