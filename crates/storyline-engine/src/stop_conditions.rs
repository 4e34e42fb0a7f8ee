//! Run-level policy for early termination and retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use storyline_model::{Counts, Specification};

/// When to stop a run and how often to retry a specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConditions {
    /// Terminal failures after which no new specification is executed.
    pub max_failures: Option<u32>,
    /// Wall-clock limit for one execution of a specification.
    pub timeout_seconds: Option<u64>,
    /// Limit for warming up the system under test.
    pub startup_timeout_seconds: Option<u64>,
    /// Executions allowed per specification, first attempt included.
    pub max_attempts: u32,
    /// Stop a specification at its first exception.
    pub break_on_exceptions: bool,
    /// Stop a specification at its first wrong.
    pub break_on_wrongs: bool,
}

impl Default for StopConditions {
    fn default() -> Self {
        Self {
            max_failures: None,
            timeout_seconds: None,
            startup_timeout_seconds: None,
            max_attempts: 1,
            break_on_exceptions: false,
            break_on_wrongs: false,
        }
    }
}

impl StopConditions {
    pub fn spec_timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_seconds.map(Duration::from_secs)
    }

    /// Attempt bound for `specification`: its own setting wins. Never below 1.
    pub fn max_attempts_for(&self, specification: &Specification) -> u32 {
        specification
            .max_attempts
            .unwrap_or(self.max_attempts)
            .max(1)
    }

    /// Whether a specification with `counts` so far should stop executing.
    pub fn should_break(&self, counts: &Counts) -> bool {
        (self.break_on_exceptions && counts.exceptions > 0)
            || (self.break_on_wrongs && counts.wrongs > 0)
    }

    pub fn failures_exceeded(&self, failures: u32) -> bool {
        matches!(self.max_failures, Some(max) if failures >= max)
    }
}
