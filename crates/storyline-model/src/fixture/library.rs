//! The fixture library: every compiled fixture of one engine run.
//!
//! Built once by [`FixtureLibrary::compile`], which compiles eligible
//! candidates in parallel and folds the results after all of them finished.
//! Read-only afterwards; share it behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cell::CellHandling;
use crate::grammar::GrammarError;
use crate::plan::SpecificationPlan;
use crate::step::Specification;

use super::registry::{FixtureCandidate, FixtureCatalog};
use super::{compile_fixture, CompiledFixture, Fixture, FixtureModel};

#[derive(Debug, Clone)]
pub struct FixtureLibrary {
    fixtures: HashMap<String, Arc<CompiledFixture>>,
    models: BTreeMap<String, FixtureModel>,
    cells: Arc<CellHandling>,
}

impl FixtureLibrary {
    pub fn empty(cells: CellHandling) -> Self {
        Self {
            fixtures: HashMap::new(),
            models: BTreeMap::new(),
            cells: Arc::new(cells),
        }
    }

    /// Compile every eligible candidate of `catalog`.
    ///
    /// Each candidate is instantiated and compiled on its own blocking task;
    /// at most `available_parallelism` run at once. A candidate that fails or
    /// panics becomes an invalid fixture. This never fails.
    pub async fn compile(catalog: &FixtureCatalog, cells: CellHandling) -> Self {
        let started = Instant::now();
        let cells = Arc::new(cells);
        let permits = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let sem = Arc::new(Semaphore::new(permits));

        let units = catalog.eligible().cloned().map(|candidate| {
            let sem = Arc::clone(&sem);
            let cells = Arc::clone(&cells);
            async move {
                let _permit = sem.acquire_owned().await.ok();
                let name = candidate.name.clone();
                let joined =
                    tokio::task::spawn_blocking(move || compile_candidate(&candidate, &cells))
                        .await;

                match joined {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        let reason = if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        };
                        warn!(fixture = %name, error = %reason, "fixture compilation panicked");
                        CompiledFixture::invalid(&name, reason)
                    }
                }
            }
        });

        let compiled = join_all(units).await;

        let mut library = Self {
            fixtures: HashMap::new(),
            models: BTreeMap::new(),
            cells,
        };
        for fixture in compiled {
            library.add(fixture);
        }

        info!(
            fixtures = library.len(),
            invalid = library.invalid_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fixture library compiled"
        );
        library
    }

    /// Compile already instantiated fixtures on the current thread.
    pub fn from_fixtures(fixtures: Vec<Box<dyn Fixture>>, cells: CellHandling) -> Self {
        let mut library = Self::empty(cells);
        for fixture in fixtures {
            let implementation = fixture.key().to_string();
            let compiled = match compile_fixture(fixture.as_ref(), &implementation, &library.cells)
            {
                Ok(compiled) => compiled,
                Err(e) => CompiledFixture::invalid(&implementation, format!("{:#}", e)),
            };
            library.add(compiled);
        }
        library
    }

    fn add(&mut self, fixture: CompiledFixture) {
        let key = fixture.key().to_string();
        if self.fixtures.contains_key(&key) {
            warn!(fixture = %key, "duplicate fixture key, keeping the last one");
        }
        self.models.insert(key.clone(), fixture.model().clone());
        self.fixtures.insert(key, Arc::new(fixture));
    }

    /// Total lookup: unknown keys yield a missing-fixture sentinel.
    pub fn fixture(&self, key: &str) -> Arc<CompiledFixture> {
        match self.fixtures.get(key) {
            Some(fixture) => Arc::clone(fixture),
            None => Arc::new(CompiledFixture::missing(key)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fixtures.contains_key(key)
    }

    pub fn model(&self, key: &str) -> Option<&FixtureModel> {
        self.models.get(key)
    }

    pub fn models(&self) -> &BTreeMap<String, FixtureModel> {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn invalid_count(&self) -> usize {
        self.models.values().filter(|m| m.is_invalid()).count()
    }

    /// Every fixture and grammar error, in fixture key order.
    pub fn errors(&self) -> Vec<GrammarError> {
        self.models.values().flat_map(FixtureModel::all_errors).collect()
    }

    pub fn cell_handling(&self) -> &CellHandling {
        &self.cells
    }

    /// Plan every step of `specification`, in section order.
    pub fn create_plan(&self, specification: &Specification) -> SpecificationPlan {
        let steps = specification
            .sections
            .iter()
            .flat_map(|section| {
                let fixture = self.fixture(&section.fixture_key);
                section
                    .steps
                    .iter()
                    .map(move |step| fixture.create_plan(step, &self.cells))
                    .collect::<Vec<_>>()
            })
            .collect();

        let plan = SpecificationPlan::new(&specification.id, steps);
        debug!(
            specification = %specification.id,
            steps = plan.len(),
            invalid = plan.invalid_steps().count(),
            "specification planned"
        );
        plan
    }
}

fn compile_candidate(candidate: &FixtureCandidate, cells: &CellHandling) -> CompiledFixture {
    let compiled = candidate
        .instantiate()
        .and_then(|fixture| compile_fixture(fixture.as_ref(), &candidate.name, cells));

    match compiled {
        Ok(compiled) => {
            debug!(fixture = %compiled.key(), implementation = %candidate.name, "fixture compiled");
            compiled
        }
        Err(e) => {
            warn!(implementation = %candidate.name, error = %e, "fixture could not be compiled");
            CompiledFixture::invalid(&candidate.name, format!("{:#}", e))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "fixture panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarSet;
    use crate::step::{Section, Step};

    struct Calculator;

    impl Fixture for Calculator {
        fn key(&self) -> &str {
            "Calculator"
        }

        fn grammars(&self) -> anyhow::Result<GrammarSet> {
            Ok(GrammarSet::new().sentence("Add", "{x} plus {y}", |_, _| Ok(None)))
        }
    }

    #[test]
    fn test_from_fixtures_and_total_lookup() {
        let library = FixtureLibrary::from_fixtures(vec![Box::new(Calculator)], CellHandling::basic());
        assert_eq!(library.len(), 1);
        assert!(library.contains("Calculator"));
        assert!(!library.contains("Ghost"));
        assert_eq!(library.fixture("Ghost").key(), "Ghost");
        assert!(library.model("Calculator").is_some());
    }

    #[test]
    fn test_create_plan_spans_sections() {
        let library = FixtureLibrary::from_fixtures(vec![Box::new(Calculator)], CellHandling::basic());
        let spec = Specification::new("s1", "Sums")
            .section(
                Section::new("Calculator")
                    .step(Step::new("Add").with_id("a").with("x", "1").with("y", "2")),
            )
            .section(Section::new("Ghost").step(Step::new("Boo").with_id("b")));

        let plan = library.create_plan(&spec);
        assert_eq!(plan.specification_id, "s1");
        assert_eq!(plan.len(), 2);
        assert!(!plan.steps[0].is_invalid());
        assert_eq!(
            plan.steps[1].as_invalid().map(|s| s.id.as_str()),
            Some("b")
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "fixture panicked");
    }
}
