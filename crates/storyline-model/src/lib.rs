//! Storyline Model
//!
//! Grammar, fixture and plan model for the Storyline acceptance test engine:
//! - cells, sentence templates and override merging
//! - runtime grammars with missing/invalid placeholders
//! - fixture discovery and parallel compilation into a `FixtureLibrary`
//! - specifications, plans, step results and report registries

pub mod cell;
pub mod context;
pub mod error;
pub mod fixture;
pub mod grammar;
pub mod plan;
pub mod reporting;
pub mod results;
pub mod step;
pub mod template;

pub use cell::{Cell, CellHandling, CellValues, Conversion};
pub use context::ExecutionContext;
pub use error::{ModelError, Result};
pub use fixture::{
    compile_fixture, fixture_key_for, is_fixture_candidate, CompiledFixture, Fixture,
    FixtureCandidate, FixtureCatalog, FixtureFactory, FixtureLibrary, FixtureModel, FixtureStatus,
};
pub use grammar::{
    not_implemented_message, Grammar, GrammarError, GrammarModel, GrammarResolution, GrammarSet,
    InvalidGrammar, MissingGrammar, Sentence, SentenceAction, SentenceGrammar,
};
pub use plan::{ExecutablePlan, Expectation, InvalidGrammarStep, Plan, SpecificationPlan};
pub use reporting::{RenderedReport, Report, ReportRegistry};
pub use results::{Counts, StepResult, StepStatus};
pub use step::{Lifecycle, Section, SpecNode, Specification, Step};
