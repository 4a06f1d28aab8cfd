//! Failure classification and retry decisions.

use crate::config::duration_secs;
use forge_training::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messages that mark a failure as transient even when the pipeline did not
/// report it as resource exhaustion.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &["CUDA out of memory", "out of memory", "resource exhausted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`.
    Retry { delay: Duration },
    /// Fail the job.
    GiveUp,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub base_backoff: Duration,
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Case-insensitive substrings that make a failure transient.
    pub transient_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(60),
            transient_patterns: DEFAULT_TRANSIENT_PATTERNS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn classify(&self, error: &PipelineError) -> FailureClass {
        match error {
            PipelineError::ResourceExhausted(_) => FailureClass::Transient,
            PipelineError::Cancelled => FailureClass::Fatal,
            PipelineError::Failed(message) => {
                let message = message.to_lowercase();
                if self.transient_patterns.iter().any(|p| message.contains(&p.to_lowercase())) {
                    FailureClass::Transient
                } else {
                    FailureClass::Fatal
                }
            }
        }
    }

    /// Delay before the attempt that follows `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << exponent).min(self.max_backoff)
    }

    /// Decides what to do after `attempt` failed with `class`.
    #[must_use]
    pub fn decide(&self, class: FailureClass, attempt: u32) -> RetryDecision {
        match class {
            FailureClass::Transient if attempt < self.max_attempts => {
                RetryDecision::Retry { delay: self.backoff(attempt) }
            }
            _ => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify(&PipelineError::resource_exhausted("disk full")), FailureClass::Transient);
        assert_eq!(
            policy.classify(&PipelineError::failed("RuntimeError: CUDA out of memory. Tried to allocate 2 GiB")),
            FailureClass::Transient
        );
        assert_eq!(policy.classify(&PipelineError::failed("dataset not found")), FailureClass::Fatal);
        assert_eq!(policy.classify(&PipelineError::Cancelled), FailureClass::Fatal);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(15));
        assert_eq!(policy.backoff(2), Duration::from_secs(30));
        assert_eq!(policy.backoff(3), Duration::from_secs(60));
        assert_eq!(policy.backoff(4), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(matches!(policy.decide(FailureClass::Transient, 1), RetryDecision::Retry { .. }));
        assert!(matches!(policy.decide(FailureClass::Transient, 2), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(FailureClass::Transient, 3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(FailureClass::Fatal, 1), RetryDecision::GiveUp);
        assert_eq!(RetryPolicy::no_retry().decide(FailureClass::Transient, 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 5\nbase_backoff = 0.5").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
    }
}
