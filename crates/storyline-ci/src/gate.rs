//! Build gate over a finished batch.

use serde::{Deserialize, Serialize};
use storyline_engine::BatchRecord;

use crate::outcome::CiOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub passed: bool,
    /// Names of failed regression specifications.
    pub violations: Vec<String>,
    /// Acceptance specifications that failed without breaking the build.
    pub ignored: usize,
    pub message: String,
}

pub struct CiGate;

impl CiGate {
    /// The build passes when no record classifies as `Failed`.
    pub fn evaluate(records: &[BatchRecord]) -> GateVerdict {
        let mut violations = Vec::new();
        let mut ignored = 0;

        for record in records {
            match CiOutcome::classify(&record.name, record.lifecycle, &record.results) {
                CiOutcome::Failed { .. } => violations.push(record.name.clone()),
                CiOutcome::Ignored { .. } => ignored += 1,
                CiOutcome::Finished { .. } => {}
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            format!("{} specification(s) passed the gate", records.len() - ignored)
        } else {
            format!("Gate failed with {} regression failure(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            ignored,
            message,
        }
    }
}
