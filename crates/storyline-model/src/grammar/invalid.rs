//! Grammar whose construction failed.

use std::sync::Arc;

use crate::cell::CellHandling;
use crate::plan::{InvalidGrammarStep, Plan};
use crate::step::Step;

use super::{Grammar, GrammarError, GrammarModel};

/// Keeps the error and implementation name of a grammar that could not be
/// built, so the failure surfaces as a compile diagnostic instead of a panic.
#[derive(Debug, Clone)]
pub struct InvalidGrammar {
    key: String,
    message: String,
    implementation: String,
    model: Arc<GrammarModel>,
}

impl InvalidGrammar {
    pub fn new(
        key: impl Into<String>,
        message: impl Into<String>,
        implementation: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let message = message.into();
        let implementation = implementation.into();
        let model = Arc::new(GrammarModel::Invalid {
            key: key.clone(),
            implementation: implementation.clone(),
            errors: vec![GrammarError::new(key.clone(), message.clone())],
        });
        Self {
            key,
            message,
            implementation,
            model,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn errors(&self) -> &[GrammarError] {
        self.model.errors()
    }
}

impl Grammar for InvalidGrammar {
    fn key(&self) -> &str {
        &self.key
    }

    fn compile(&self, _cells: &CellHandling) -> Arc<GrammarModel> {
        Arc::clone(&self.model)
    }

    fn create_plan(&self, step: &Step, _cells: &CellHandling) -> Plan {
        Plan::Invalid(InvalidGrammarStep::new(&step.id, self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_registered_with_implementation() {
        let grammar = InvalidGrammar::new("Add", "bad cell type", "math::AddGrammar");
        assert_eq!(grammar.errors().len(), 1);
        assert_eq!(grammar.errors()[0].error, "bad cell type");
        assert_eq!(grammar.implementation(), "math::AddGrammar");

        match grammar.compile(&CellHandling::basic()).as_ref() {
            GrammarModel::Invalid { implementation, .. } => {
                assert_eq!(implementation, "math::AddGrammar")
            }
            other => panic!("expected invalid model, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_carries_step_id_and_message() {
        let grammar = InvalidGrammar::new("Add", "bad cell type", "math::AddGrammar");
        let step = Step::new("Add").with_id("s-2");
        let plan = grammar.create_plan(&step, &CellHandling::basic());
        let invalid = plan.as_invalid().expect("expected invalid step");
        assert_eq!(invalid.id, "s-2");
        assert_eq!(invalid.message, "bad cell type");
    }
}
