//! CI outcomes and the text escaping build servers require.

use std::fmt;

use serde::{Deserialize, Serialize};
use storyline_engine::SpecResults;
use storyline_model::Lifecycle;

/// How one specification shows up on the build server.
///
/// `name`, `message` and `details` are already escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CiOutcome {
    Finished { name: String, message: String },
    /// A failed acceptance specification; informative, not build breaking.
    Ignored { name: String, message: String },
    Failed { name: String, details: String },
}

impl CiOutcome {
    /// Classify the final results of a specification.
    ///
    /// Success finishes the test. A failed `Acceptance` specification is
    /// ignored; a failed `Regression` specification fails the build.
    pub fn classify(name: &str, lifecycle: Lifecycle, results: &SpecResults) -> Self {
        let name = escape_ci_text(name);
        let summary = escape_ci_text(&results.summary());

        if results.was_successful() {
            CiOutcome::Finished {
                name,
                message: summary,
            }
        } else if lifecycle.is_mandatory() {
            CiOutcome::Failed {
                name,
                details: summary,
            }
        } else {
            CiOutcome::Ignored {
                name,
                message: format!("Acceptance test failed: {}", summary),
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CiOutcome::Finished { name, .. }
            | CiOutcome::Ignored { name, .. }
            | CiOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CiOutcome::Failed { .. })
    }
}

/// Service-message form, e.g. `##ci[testFailed name='x' details='y']`.
impl fmt::Display for CiOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CiOutcome::Finished { name, message } => {
                write!(f, "##ci[testFinished name='{}' message='{}']", name, message)
            }
            CiOutcome::Ignored { name, message } => {
                write!(f, "##ci[testIgnored name='{}' message='{}']", name, message)
            }
            CiOutcome::Failed { name, details } => {
                write!(f, "##ci[testFailed name='{}' details='{}']", name, details)
            }
        }
    }
}

/// Escape `|`, `'`, `\n`, `\r`, `[` and `]` with a leading `|`.
pub fn escape_ci_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            other => escaped.push(other),
        }
    }
    escaped
}
