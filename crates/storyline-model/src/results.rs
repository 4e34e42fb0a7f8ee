//! Step results and counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// Executed with nothing to check.
    Ok,
    /// Result matched the expectation.
    Right,
    /// Result did not match the expectation.
    Wrong { expected: String, actual: String },
    /// The action failed or panicked.
    Error { message: String },
    /// The step could not be planned.
    SyntaxError { message: String },
}

impl StepStatus {
    pub fn is_exception(&self) -> bool {
        matches!(self, StepStatus::Error { .. })
    }

    pub fn is_wrong(&self) -> bool {
        matches!(self, StepStatus::Wrong { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn new(id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            id: id.into(),
            status,
            duration_ms: 0,
        }
    }
}

/// Tally of step outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub rights: u32,
    pub wrongs: u32,
    pub exceptions: u32,
    pub syntax_errors: u32,
}

impl Counts {
    pub fn new(rights: u32, wrongs: u32, exceptions: u32, syntax_errors: u32) -> Self {
        Self {
            rights,
            wrongs,
            exceptions,
            syntax_errors,
        }
    }

    pub fn tally(&mut self, status: &StepStatus) {
        match status {
            StepStatus::Ok => {}
            StepStatus::Right => self.rights += 1,
            StepStatus::Wrong { .. } => self.wrongs += 1,
            StepStatus::Error { .. } => self.exceptions += 1,
            StepStatus::SyntaxError { .. } => self.syntax_errors += 1,
        }
    }

    pub fn add(&mut self, other: &Counts) {
        self.rights += other.rights;
        self.wrongs += other.wrongs;
        self.exceptions += other.exceptions;
        self.syntax_errors += other.syntax_errors;
    }

    pub fn was_successful(&self) -> bool {
        self.wrongs == 0 && self.exceptions == 0 && self.syntax_errors == 0
    }
}

impl<'a> FromIterator<&'a StepStatus> for Counts {
    fn from_iter<I: IntoIterator<Item = &'a StepStatus>>(iter: I) -> Self {
        let mut counts = Counts::default();
        for status in iter {
            counts.tally(status);
        }
        counts
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} correct, {} wrong, {} exceptions, {} syntax errors",
            self.rights, self.wrongs, self.exceptions, self.syntax_errors
        )
    }
}
