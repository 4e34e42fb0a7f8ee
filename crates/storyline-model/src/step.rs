//! Specification tree: steps grouped into fixture sections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One use of a grammar with concrete cell values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "key")]
    pub grammar_key: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl Step {
    pub fn new(grammar_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            grammar_key: grammar_key.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with(mut self, cell: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(cell.into(), value.into());
        self
    }
}

/// Criticality of a specification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Work in progress; failures are reported but do not fail the build.
    #[default]
    Acceptance,
    /// Must keep passing.
    Regression,
}

impl Lifecycle {
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Lifecycle::Regression)
    }
}

/// Steps run against one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub fixture_key: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Section {
    pub fn new(fixture_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fixture_key: fixture_key.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// One test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Overrides the run-level attempt bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Specification {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lifecycle: Lifecycle::default(),
            max_attempts: None,
            sections: Vec::new(),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn step_count(&self) -> usize {
        self.sections.iter().map(|s| s.steps.len()).sum()
    }

    pub fn node(&self) -> SpecNode {
        SpecNode {
            id: self.id.clone(),
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            run_id: None,
        }
    }
}

/// Header of a specification, used to track batch membership.
///
/// `run_id` pins the node to one queued execution. Without it the node
/// matches the latest result for its specification id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecNode {
    pub id: String,
    pub name: String,
    pub lifecycle: Lifecycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl SpecNode {
    pub fn for_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}
