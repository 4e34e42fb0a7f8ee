//! Fixtures: named step vocabularies.
//!
//! A [`Fixture`] is user code exposing a [`GrammarSet`]. Compiling it yields a
//! [`CompiledFixture`]: the runtime grammars plus a serializable
//! [`FixtureModel`]. Fixtures that were never registered or could not be
//! built become sentinel compiled fixtures so lookups never fail.

pub mod library;
pub mod registry;
pub mod sentinel;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cell::CellHandling;
use crate::grammar::{GrammarError, GrammarModel, GrammarResolution, GrammarSet};
use crate::plan::{InvalidGrammarStep, Plan};
use crate::step::Step;

pub use library::FixtureLibrary;
pub use registry::{
    fixture_key_for, is_fixture_candidate, FixtureCandidate, FixtureCatalog, FixtureFactory,
};
pub use sentinel::missing_fixture_message;

/// A step vocabulary.
pub trait Fixture: Send + Sync {
    fn key(&self) -> &str;

    fn title(&self) -> Option<&str> {
        None
    }

    /// Build the fixture's grammars. An error marks the whole fixture invalid.
    fn grammars(&self) -> anyhow::Result<GrammarSet>;
}

/// Serializable metadata of a compiled fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureModel {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub implementation: String,
    #[serde(default)]
    pub grammars: BTreeMap<String, GrammarModel>,
    /// Fixture-level errors; grammar errors live on the grammars.
    #[serde(default)]
    pub errors: Vec<GrammarError>,
}

impl FixtureModel {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: None,
            implementation: String::new(),
            grammars: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_grammar(mut self, grammar: GrammarModel) -> Self {
        self.grammars.insert(grammar.key().to_string(), grammar);
        self
    }

    pub fn is_invalid(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn find_grammar(&self, key: &str) -> Option<&GrammarModel> {
        self.grammars.get(key)
    }

    /// Fixture-level errors followed by every grammar error.
    pub fn all_errors(&self) -> Vec<GrammarError> {
        self.errors
            .iter()
            .cloned()
            .chain(self.grammars.values().flat_map(|g| g.errors().iter().cloned()))
            .collect()
    }

    /// Merge an authored model into this compiled one, grammar by grammar.
    /// Grammars only the authored model knows are kept as authored.
    pub fn apply_overrides(&self, authored: &FixtureModel) -> FixtureModel {
        let mut grammars: BTreeMap<String, GrammarModel> = self
            .grammars
            .iter()
            .map(|(key, grammar)| {
                (
                    key.clone(),
                    grammar.apply_overrides(authored.grammars.get(key)),
                )
            })
            .collect();

        for (key, grammar) in &authored.grammars {
            grammars
                .entry(key.clone())
                .or_insert_with(|| grammar.clone());
        }

        FixtureModel {
            key: self.key.clone(),
            title: authored.title.clone().or_else(|| self.title.clone()),
            implementation: self.implementation.clone(),
            grammars,
            errors: self.errors.clone(),
        }
    }

    /// Stub code for every authored grammar this fixture does not implement.
    pub fn missing_code_for(&self, authored: &FixtureModel) -> String {
        authored
            .grammars
            .values()
            .filter(|g| {
                self.grammars
                    .get(g.key())
                    .map_or(true, |own| !own.is_usable())
            })
            .map(GrammarModel::to_missing_code)
            .collect()
    }
}

/// How a compiled fixture came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureStatus {
    Ready,
    Missing,
    Invalid,
}

/// Runtime grammars of a fixture plus their model.
#[derive(Clone)]
pub struct CompiledFixture {
    status: FixtureStatus,
    grammars: GrammarSet,
    model: FixtureModel,
}

impl CompiledFixture {
    pub fn key(&self) -> &str {
        &self.model.key
    }

    pub fn status(&self) -> FixtureStatus {
        self.status
    }

    pub fn model(&self) -> &FixtureModel {
        &self.model
    }

    pub fn resolve(&self, grammar_key: &str) -> GrammarResolution {
        self.grammars.resolve(grammar_key)
    }

    /// Plan one step. An invalid fixture turns every step into an invalid
    /// step carrying the fixture's error.
    pub fn create_plan(&self, step: &Step, cells: &CellHandling) -> Plan {
        if self.status == FixtureStatus::Invalid {
            let message = self
                .model
                .errors
                .first()
                .map(|e| e.error.clone())
                .unwrap_or_default();
            return Plan::Invalid(InvalidGrammarStep::new(&step.id, message));
        }

        self.resolve(&step.grammar_key)
            .into_grammar()
            .create_plan(step, cells)
    }
}

impl std::fmt::Debug for CompiledFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFixture")
            .field("key", &self.model.key)
            .field("status", &self.status)
            .field("grammars", &self.grammars.len())
            .finish()
    }
}

/// Compile one fixture instance.
pub fn compile_fixture(
    fixture: &dyn Fixture,
    implementation: &str,
    cells: &CellHandling,
) -> anyhow::Result<CompiledFixture> {
    let grammars = fixture.grammars()?;
    let model = FixtureModel {
        key: fixture.key().to_string(),
        title: fixture.title().map(str::to_string),
        implementation: implementation.to_string(),
        grammars: grammars.compile(cells),
        errors: Vec::new(),
    };

    Ok(CompiledFixture {
        status: FixtureStatus::Ready,
        grammars,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::grammar::{MissingGrammar, Sentence, SentenceGrammar};

    struct MathFixture;

    impl Fixture for MathFixture {
        fn key(&self) -> &str {
            "Math"
        }

        fn title(&self) -> Option<&str> {
            Some("Simple math")
        }

        fn grammars(&self) -> anyhow::Result<GrammarSet> {
            Ok(GrammarSet::new()
                .sentence("StartWith", "Start with {x}", |_, _| Ok(None))
                .try_add::<SentenceGrammar, _>(
                    "Divide",
                    "math::Divide",
                    Err("division grammar is unfinished"),
                ))
        }
    }

    #[test]
    fn test_compile_fixture_model() {
        let compiled = compile_fixture(&MathFixture, "math::MathFixture", &CellHandling::basic())
            .unwrap();
        let model = compiled.model();
        assert_eq!(model.key, "Math");
        assert_eq!(model.title.as_deref(), Some("Simple math"));
        assert!(!model.is_invalid());
        assert_eq!(model.grammars.len(), 2);

        let errors = model.all_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "Divide");
    }

    #[test]
    fn test_create_plan_routes_missing_grammars() {
        let compiled = compile_fixture(&MathFixture, "math::MathFixture", &CellHandling::basic())
            .unwrap();
        let step = Step::new("Multiply").with_id("3");
        let plan = compiled.create_plan(&step, &CellHandling::basic());
        assert_eq!(
            plan.as_invalid().map(|s| s.message.as_str()),
            Some("Grammar 'Multiply' is not implemented")
        );
    }

    #[test]
    fn test_apply_overrides_merges_and_appends() {
        let compiled = FixtureModel::new("Math")
            .with_grammar(GrammarModel::Sentence(Sentence::new("StartWith", "Start with {x}")));
        let authored = FixtureModel {
            title: Some("Authored math".into()),
            ..FixtureModel::new("Math")
        }
        .with_grammar(GrammarModel::Sentence(Sentence::with_cells(
            "StartWith",
            "Begin at {x}",
            vec![Cell::string("x").with_header("X")],
        )))
        .with_grammar(GrammarModel::Sentence(Sentence::new("Multiply", "Times {y}")));

        let merged = compiled.apply_overrides(&authored);
        assert_eq!(merged.title.as_deref(), Some("Authored math"));
        assert_eq!(merged.grammars.len(), 2);
        assert_eq!(merged.grammars["StartWith"].title_or_format(), "Begin at {x}");
        assert!(merged.find_grammar("Multiply").is_some());
    }

    #[test]
    fn test_missing_code_for_unimplemented_grammars() {
        let compiled = FixtureModel::new("Math")
            .with_grammar(GrammarModel::Sentence(Sentence::new("StartWith", "Start with {x}")))
            .with_grammar(MissingGrammar::new("Divide").model().as_ref().clone());
        let authored = FixtureModel::new("Math")
            .with_grammar(GrammarModel::Sentence(Sentence::new("StartWith", "Start with {x}")))
            .with_grammar(GrammarModel::Sentence(Sentence::new("Divide", "Divide by {d}")))
            .with_grammar(GrammarModel::Sentence(Sentence::new("Negate", "Negate")));

        let code = compiled.missing_code_for(&authored);
        assert!(code.contains("pub fn Divide(&self, d: String)"));
        assert!(code.contains("pub fn Negate(&self)"));
        assert!(!code.contains("StartWith"));
    }
}
