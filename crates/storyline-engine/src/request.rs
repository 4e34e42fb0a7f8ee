//! Queued executions.

use std::sync::Arc;

use storyline_model::{SpecNode, Specification, SpecificationPlan};
use uuid::Uuid;

/// One specification waiting for, or going through, execution.
///
/// `attempts` is one-based: a new request has made its first attempt once
/// it runs, and every requeue increments it.
#[derive(Debug, Clone)]
pub struct SpecExecutionRequest {
    pub id: Uuid,
    pub specification: Arc<Specification>,
    pub plan: Arc<SpecificationPlan>,
    pub attempts: u32,
}

impl SpecExecutionRequest {
    pub fn new(specification: Specification, plan: SpecificationPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            specification: Arc::new(specification),
            plan: Arc::new(plan),
            attempts: 1,
        }
    }

    /// Request that can never run, e.g. because the engine is gone.
    pub fn unplanned(specification: Specification) -> Self {
        let plan = SpecificationPlan::new(&specification.id, Vec::new());
        Self::new(specification, plan)
    }

    pub fn specification_id(&self) -> &str {
        &self.specification.id
    }

    /// Batch node bound to this execution.
    pub fn node(&self) -> SpecNode {
        self.specification.node().for_run(self.id)
    }

    /// The same request, one attempt later.
    pub fn requeued(mut self) -> Self {
        self.attempts += 1;
        self
    }
}
