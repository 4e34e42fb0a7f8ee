//! Grammars: the step vocabulary of a fixture.
//!
//! A grammar has two faces:
//!
//! - [`GrammarModel`]: serializable metadata (`Sentence`, `Missing`,
//!   `Invalid`) used by editors, override merging and stub generation.
//! - [`Grammar`]: the runtime trait that compiles to a model and turns a
//!   [`Step`] into a [`Plan`].
//!
//! Resolving a grammar key never fails: it yields a [`GrammarResolution`]
//! that downstream code branches on.
//!
//! # Modules
//!
//! - [`sentence`]: `Sentence` model and `SentenceGrammar`
//! - [`missing`]: `MissingGrammar` placeholder for unresolved keys
//! - [`invalid`]: `InvalidGrammar` wrapper for construction failures

pub mod invalid;
pub mod missing;
pub mod sentence;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::CellHandling;
use crate::plan::Plan;
use crate::step::Step;

pub use invalid::InvalidGrammar;
pub use missing::MissingGrammar;
pub use sentence::{Sentence, SentenceAction, SentenceGrammar};

/// A grammar-level diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarError {
    pub key: String,
    pub error: String,
}

impl GrammarError {
    pub fn new(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: error.into(),
        }
    }
}

/// Message carried by every missing grammar.
pub fn not_implemented_message(key: &str) -> String {
    format!("Grammar '{}' is not implemented", key)
}

/// Compiled grammar metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrammarModel {
    Sentence(Sentence),

    /// Placeholder for a grammar key that resolves to nothing.
    Missing {
        key: String,
        errors: Vec<GrammarError>,
    },

    /// A grammar whose construction failed.
    Invalid {
        key: String,
        implementation: String,
        errors: Vec<GrammarError>,
    },
}

impl GrammarModel {
    pub fn key(&self) -> &str {
        match self {
            GrammarModel::Sentence(s) => &s.key,
            GrammarModel::Missing { key, .. } | GrammarModel::Invalid { key, .. } => key,
        }
    }

    /// Errors registered on this grammar at construction time.
    pub fn errors(&self) -> &[GrammarError] {
        match self {
            GrammarModel::Sentence(_) => &[],
            GrammarModel::Missing { errors, .. } | GrammarModel::Invalid { errors, .. } => errors,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.errors().is_empty()
    }

    /// Merge an authored grammar into this compiled one.
    ///
    /// A missing or invalid grammar has nothing of its own to keep, so an
    /// override replaces it; without one it stays as it is.
    pub fn apply_overrides(&self, over: Option<&GrammarModel>) -> GrammarModel {
        match self {
            GrammarModel::Sentence(sentence) => {
                GrammarModel::Sentence(sentence.apply_overrides(over))
            }
            GrammarModel::Missing { .. } | GrammarModel::Invalid { .. } => match over {
                Some(over) => over.apply_overrides(None),
                None => self.clone(),
            },
        }
    }

    /// Stub source for an unimplemented grammar. Empty for non-sentences.
    pub fn to_missing_code(&self) -> String {
        match self {
            GrammarModel::Sentence(sentence) => sentence.to_missing_code(),
            _ => String::new(),
        }
    }

    pub fn title_or_format(&self) -> &str {
        match self {
            GrammarModel::Sentence(sentence) => sentence.title_or_format(),
            other => other.key(),
        }
    }
}

/// Runtime grammar: compiles to metadata and produces plans.
pub trait Grammar: Send + Sync {
    fn key(&self) -> &str;

    /// Compile this grammar into its model.
    fn compile(&self, cells: &CellHandling) -> Arc<GrammarModel>;

    /// Compile a step into a plan. Never panics; unusable grammars degrade
    /// to an invalid step carrying the step's id.
    fn create_plan(&self, step: &Step, cells: &CellHandling) -> Plan;
}

/// Outcome of looking up a grammar key in a fixture.
#[derive(Clone)]
pub enum GrammarResolution {
    Resolved(Arc<dyn Grammar>),
    Missing(Arc<MissingGrammar>),
    Invalid(Arc<InvalidGrammar>),
}

impl GrammarResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, GrammarResolution::Resolved(_))
    }

    pub fn key(&self) -> &str {
        match self {
            GrammarResolution::Resolved(g) => g.key(),
            GrammarResolution::Missing(g) => g.key(),
            GrammarResolution::Invalid(g) => g.key(),
        }
    }

    pub fn into_grammar(self) -> Arc<dyn Grammar> {
        match self {
            GrammarResolution::Resolved(g) => g,
            GrammarResolution::Missing(g) => g,
            GrammarResolution::Invalid(g) => g,
        }
    }
}

impl std::fmt::Debug for GrammarResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            GrammarResolution::Resolved(_) => "Resolved",
            GrammarResolution::Missing(_) => "Missing",
            GrammarResolution::Invalid(_) => "Invalid",
        };
        write!(f, "{}({})", kind, self.key())
    }
}

/// Either a usable grammar or the failure that replaced it.
#[derive(Clone)]
enum GrammarSlot {
    Ready(Arc<dyn Grammar>),
    Broken(Arc<InvalidGrammar>),
}

/// Ordered collection of a fixture's grammars, keyed by grammar key.
#[derive(Clone, Default)]
pub struct GrammarSet {
    slots: BTreeMap<String, GrammarSlot>,
}

impl GrammarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grammar. A later grammar with the same key replaces the earlier.
    pub fn add<G: Grammar + 'static>(mut self, grammar: G) -> Self {
        self.insert(Arc::new(grammar));
        self
    }

    pub fn insert(&mut self, grammar: Arc<dyn Grammar>) {
        self.slots
            .insert(grammar.key().to_string(), GrammarSlot::Ready(grammar));
    }

    /// Add a sentence grammar built from a format template.
    pub fn sentence<F>(self, key: &str, format: &str, action: F) -> Self
    where
        F: Fn(
                &crate::cell::CellValues,
                &mut crate::context::ExecutionContext,
            ) -> anyhow::Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        self.add(SentenceGrammar::new(key, format, action))
    }

    /// Add the outcome of a fallible grammar construction. A failure is kept
    /// as an [`InvalidGrammar`] so it shows up in compile diagnostics.
    pub fn try_add<G, E>(mut self, key: &str, implementation: &str, built: Result<G, E>) -> Self
    where
        G: Grammar + 'static,
        E: std::fmt::Display,
    {
        match built {
            Ok(grammar) => self.insert(Arc::new(grammar)),
            Err(e) => {
                let invalid = InvalidGrammar::new(key, e.to_string(), implementation);
                self.slots
                    .insert(key.to_string(), GrammarSlot::Broken(Arc::new(invalid)));
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Total lookup: unknown keys resolve to a [`MissingGrammar`].
    pub fn resolve(&self, key: &str) -> GrammarResolution {
        match self.slots.get(key) {
            Some(GrammarSlot::Ready(grammar)) => GrammarResolution::Resolved(Arc::clone(grammar)),
            Some(GrammarSlot::Broken(invalid)) => GrammarResolution::Invalid(Arc::clone(invalid)),
            None => GrammarResolution::Missing(Arc::new(MissingGrammar::new(key))),
        }
    }

    /// Compile every grammar into its model.
    pub fn compile(&self, cells: &CellHandling) -> BTreeMap<String, GrammarModel> {
        self.slots
            .iter()
            .map(|(key, slot)| {
                let model = match slot {
                    GrammarSlot::Ready(grammar) => grammar.compile(cells),
                    GrammarSlot::Broken(invalid) => invalid.compile(cells),
                };
                (key.clone(), model.as_ref().clone())
            })
            .collect()
    }
}
