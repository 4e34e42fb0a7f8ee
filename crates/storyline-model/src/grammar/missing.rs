//! Placeholder grammar for keys that resolve to nothing.

use std::sync::Arc;

use crate::cell::CellHandling;
use crate::plan::{InvalidGrammarStep, Plan};
use crate::step::Step;

use super::{not_implemented_message, Grammar, GrammarError, GrammarModel};

/// Stands in for an unregistered grammar key. Compiling it is a no-op and
/// every plan it creates is an [`InvalidGrammarStep`].
#[derive(Debug, Clone)]
pub struct MissingGrammar {
    key: String,
    model: Arc<GrammarModel>,
}

impl MissingGrammar {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let model = Arc::new(GrammarModel::Missing {
            key: key.clone(),
            errors: vec![GrammarError::new(key.clone(), not_implemented_message(&key))],
        });
        Self { key, model }
    }

    pub fn errors(&self) -> &[GrammarError] {
        self.model.errors()
    }

    pub fn model(&self) -> &Arc<GrammarModel> {
        &self.model
    }
}

impl Grammar for MissingGrammar {
    fn key(&self) -> &str {
        &self.key
    }

    fn compile(&self, _cells: &CellHandling) -> Arc<GrammarModel> {
        Arc::clone(&self.model)
    }

    fn create_plan(&self, step: &Step, _cells: &CellHandling) -> Plan {
        Plan::Invalid(InvalidGrammarStep::new(
            &step.id,
            not_implemented_message(&self.key),
        ))
    }
}
