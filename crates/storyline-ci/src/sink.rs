//! Where CI outcomes go.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::outcome::CiOutcome;

pub trait CiSink: Send + Sync {
    fn report(&self, outcome: CiOutcome);
}

/// Emits each outcome as a service message through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CiSink for TracingSink {
    fn report(&self, outcome: CiOutcome) {
        if outcome.is_failure() {
            warn!(target: "storyline::ci", "{}", outcome);
        } else {
            info!(target: "storyline::ci", "{}", outcome);
        }
    }
}

/// Keeps outcomes in memory, in report order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    outcomes: Mutex<Vec<CiOutcome>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<CiOutcome> {
        match self.outcomes.lock() {
            Ok(outcomes) => outcomes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CiSink for CollectingSink {
    fn report(&self, outcome: CiOutcome) {
        match self.outcomes.lock() {
            Ok(mut outcomes) => outcomes.push(outcome),
            Err(poisoned) => poisoned.into_inner().push(outcome),
        }
    }
}
