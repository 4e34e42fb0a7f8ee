//! Results of one specification execution.

use serde::{Deserialize, Serialize};
use storyline_model::{Counts, RenderedReport, StepResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecResults {
    pub specification_id: String,
    pub counts: Counts,
    pub duration_ms: u64,
    /// Attempt that produced these results, starting at 1.
    pub attempts: u32,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub reports: Vec<RenderedReport>,
    /// The execution did not run to the end.
    #[serde(default)]
    pub aborted: bool,
    /// Why the execution was cut short, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpecResults {
    /// Terminal results for a specification that never ran to completion.
    /// Counted as one exception.
    pub fn aborted(specification_id: &str, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            specification_id: specification_id.to_string(),
            counts: Counts::new(0, 0, 1, 0),
            duration_ms: 0,
            attempts,
            steps: Vec::new(),
            reports: Vec::new(),
            aborted: true,
            error: Some(reason.into()),
        }
    }

    pub fn was_successful(&self) -> bool {
        !self.aborted && self.counts.was_successful()
    }

    /// One-line description used by reporters.
    pub fn summary(&self) -> String {
        match &self.error {
            Some(error) => format!("{} ({})", self.counts, error),
            None => self.counts.to_string(),
        }
    }
}
