//! Integration tests for the `forge` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config that keeps all state under `temp` and retries quickly.
fn write_config(temp: &TempDir) -> PathBuf {
    let root = temp.path();
    let path = root.join("forge.toml");
    let content = format!(
        r#"
[scheduler]
job_timeout = 0
cancel_grace = 2
poll_interval = 0.05

[retry]
max_attempts = 3
base_backoff = 0.01
max_backoff = 0.05

[storage]
backend = "sqlite"
database_path = "{}"
models_dir = "{}"
"#,
        root.join("jobs.db").display(),
        root.join("models").display()
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn forge(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("forge").unwrap();
    cmd.current_dir(temp.path()).env("HOME", temp.path()).env("NO_COLOR", "1");
    cmd
}

fn run_json(temp: &TempDir, config: &Path, extra: &[&str]) -> serde_json::Value {
    let output = forge(temp)
        .arg("--config")
        .arg(config)
        .args(["run", "--json", "--step-delay-ms", "1", "--max-steps", "3"])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_run_completes_and_registers_model() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let jobs = run_json(&temp, &config, &["--jobs", "2", "--tenant", "acme"]);
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    for job in jobs {
        assert_eq!(job["status"], "completed");
        assert_eq!(job["progress"], 100.0);
        assert!(job["model_id"].is_string());
    }

    forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["list", "--tenant", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Training Jobs (2)"));

    forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["models", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_active\": true"));
}

#[test]
fn test_run_retries_transient_failures() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let jobs = run_json(&temp, &config, &["--transient-failures", "1"]);
    let job = &jobs[0];
    assert_eq!(job["status"], "completed");
    assert_eq!(job["attempts"], 2);
}

#[test]
fn test_run_fails_after_retry_ceiling() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let jobs = run_json(&temp, &config, &["--transient-failures", "5"]);
    let job = &jobs[0];
    assert_eq!(job["status"], "failed");
    assert_eq!(job["attempts"], 3);
    assert!(job["error_message"].as_str().unwrap().contains("CUDA out of memory"));
}

#[test]
fn test_run_cancel_after() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let output = forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["run", "--json", "--step-delay-ms", "20", "--max-steps", "500", "--cancel-after-ms", "100"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(jobs[0]["status"], "cancelled");
    assert!(jobs[0]["model_id"].is_null());
}

#[test]
fn test_status_unknown_job() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["status", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job not found"));
}

#[test]
fn test_status_after_run() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    let jobs = run_json(&temp, &config, &["--name", "nightly"]);
    let id = jobs[0]["id"].as_str().unwrap().to_string();

    forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["status", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly"))
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn test_config_init_and_show() {
    let temp = TempDir::new().unwrap();

    forge(&temp).args(["config", "init", "--local"]).assert().success();
    assert!(temp.path().join(".forgerc").exists());

    forge(&temp).args(["config", "init", "--local"]).assert().failure();

    forge(&temp)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts = 3"));
}

#[test]
fn test_cleanup_json() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    forge(&temp)
        .arg("--config")
        .arg(&config)
        .args(["cleanup", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"retention_days\": 30"));
}
