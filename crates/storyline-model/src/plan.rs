//! Compiled, runnable form of steps and specifications.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cell::CellValues;
use crate::context::ExecutionContext;
use crate::grammar::SentenceAction;
use crate::results::{StepResult, StepStatus};

/// A step that cannot execute. Reported as a syntax error carrying the
/// offending step's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidGrammarStep {
    pub id: String,
    pub message: String,
}

impl InvalidGrammarStep {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn result(&self) -> StepResult {
        StepResult {
            id: self.id.clone(),
            status: StepStatus::SyntaxError {
                message: self.message.clone(),
            },
            duration_ms: 0,
        }
    }
}

/// Value a result cell is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub cell: String,
    pub expected: Option<String>,
}

/// A step bound to its grammar action and converted cell values.
#[derive(Clone)]
pub struct ExecutablePlan {
    pub id: String,
    pub grammar_key: String,
    pub description: String,
    pub values: CellValues,
    pub expectation: Option<Expectation>,
    action: SentenceAction,
}

impl ExecutablePlan {
    pub fn new(
        id: impl Into<String>,
        grammar_key: impl Into<String>,
        description: impl Into<String>,
        values: CellValues,
        expectation: Option<Expectation>,
        action: SentenceAction,
    ) -> Self {
        Self {
            id: id.into(),
            grammar_key: grammar_key.into(),
            description: description.into(),
            values,
            expectation,
            action,
        }
    }

    /// Run the action and grade its outcome against the expectation.
    pub fn execute(&self, context: &mut ExecutionContext) -> StepResult {
        let started = Instant::now();
        let outcome = (self.action)(&self.values, context);
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = match outcome {
            Err(e) => StepStatus::Error {
                message: format!("{:#}", e),
            },
            Ok(actual) => match &self.expectation {
                Some(Expectation {
                    expected: Some(expected),
                    ..
                }) => {
                    let actual = actual.unwrap_or_default();
                    if &actual == expected {
                        StepStatus::Right
                    } else {
                        StepStatus::Wrong {
                            expected: expected.clone(),
                            actual,
                        }
                    }
                }
                _ => StepStatus::Ok,
            },
        };

        debug!(step = %self.id, grammar = %self.grammar_key, ?status, "step executed");

        StepResult {
            id: self.id.clone(),
            status,
            duration_ms,
        }
    }
}

impl fmt::Debug for ExecutablePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutablePlan")
            .field("id", &self.id)
            .field("grammar_key", &self.grammar_key)
            .field("description", &self.description)
            .field("values", &self.values)
            .field("expectation", &self.expectation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Plan {
    Executable(ExecutablePlan),
    Invalid(InvalidGrammarStep),
}

impl Plan {
    pub fn id(&self) -> &str {
        match self {
            Plan::Executable(plan) => &plan.id,
            Plan::Invalid(step) => &step.id,
        }
    }

    pub fn execute(&self, context: &mut ExecutionContext) -> StepResult {
        match self {
            Plan::Executable(plan) => plan.execute(context),
            Plan::Invalid(step) => step.result(),
        }
    }

    pub fn as_invalid(&self) -> Option<&InvalidGrammarStep> {
        match self {
            Plan::Invalid(step) => Some(step),
            Plan::Executable(_) => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.as_invalid().is_some()
    }
}

/// Ordered plans of one specification.
#[derive(Debug, Clone, Default)]
pub struct SpecificationPlan {
    pub specification_id: String,
    pub steps: Vec<Plan>,
}

impl SpecificationPlan {
    pub fn new(specification_id: impl Into<String>, steps: Vec<Plan>) -> Self {
        Self {
            specification_id: specification_id.into(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Invalid steps, in plan order.
    pub fn invalid_steps(&self) -> impl Iterator<Item = &InvalidGrammarStep> {
        self.steps.iter().filter_map(Plan::as_invalid)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn make_action<F>(f: F) -> SentenceAction
    where
        F: Fn(&CellValues, &mut ExecutionContext) -> anyhow::Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    fn plan_returning(result: anyhow::Result<Option<String>>, expected: Option<&str>) -> Plan {
        let result = std::sync::Mutex::new(Some(result));
        let action = make_action(move |_, _| {
            result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(None))
        });
        Plan::Executable(ExecutablePlan::new(
            "1",
            "Check",
            "check",
            CellValues::default(),
            expected.map(|e| Expectation {
                cell: "out".into(),
                expected: Some(e.into()),
            }),
            action,
        ))
    }

    #[test]
    fn test_right_and_wrong() {
        let mut context = ExecutionContext::new("spec");

        let right = plan_returning(Ok(Some("5".into())), Some("5")).execute(&mut context);
        assert_eq!(right.status, StepStatus::Right);

        let wrong = plan_returning(Ok(Some("4".into())), Some("5")).execute(&mut context);
        assert_eq!(
            wrong.status,
            StepStatus::Wrong {
                expected: "5".into(),
                actual: "4".into()
            }
        );
    }

    #[test]
    fn test_no_expectation_is_ok() {
        let mut context = ExecutionContext::new("spec");
        let result = plan_returning(Ok(None), None).execute(&mut context);
        assert_eq!(result.status, StepStatus::Ok);
        assert_eq!(result.id, "1");
    }

    #[test]
    fn test_action_error_is_exception() {
        let mut context = ExecutionContext::new("spec");
        let result =
            plan_returning(Err(anyhow::anyhow!("kaboom")), Some("5")).execute(&mut context);
        match result.status {
            StepStatus::Error { message } => assert!(message.contains("kaboom")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_step_is_syntax_error() {
        let mut context = ExecutionContext::new("spec");
        let plan = Plan::Invalid(InvalidGrammarStep::new("9", "nope"));
        assert_eq!(plan.id(), "9");
        let result = plan.execute(&mut context);
        assert_eq!(
            result.status,
            StepStatus::SyntaxError {
                message: "nope".into()
            }
        );
    }
}
