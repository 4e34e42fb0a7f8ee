//! Fixture candidates and the catalog the host registers them in.

use std::fmt;
use std::sync::Arc;

use super::Fixture;

/// Builds a fresh fixture instance.
pub type FixtureFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn Fixture>> + Send + Sync>;

/// A type the host offers for fixture discovery.
#[derive(Clone)]
pub struct FixtureCandidate {
    /// Implementation name, usually `std::any::type_name` of the fixture.
    pub name: String,
    /// Whether the type implements [`Fixture`] at all.
    pub is_fixture: bool,
    pub hidden: bool,
    /// Generic type whose parameters were never bound.
    pub open_generic: bool,
    /// Present when the type can be built without arguments.
    pub factory: Option<FixtureFactory>,
}

impl FixtureCandidate {
    /// Candidate for a default-constructible fixture type.
    pub fn of<F: Fixture + Default + 'static>() -> Self {
        Self::new(std::any::type_name::<F>(), || Ok(Box::new(F::default())))
    }

    /// Candidate built by an arbitrary factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Fixture>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            is_fixture: true,
            hidden: false,
            open_generic: false,
            factory: Some(Arc::new(factory)),
        }
    }

    /// A fixture type that needs constructor arguments.
    pub fn without_default_constructor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_fixture: true,
            hidden: false,
            open_generic: false,
            factory: None,
        }
    }

    /// A type that is not a fixture.
    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_fixture: false,
            hidden: false,
            open_generic: false,
            factory: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn open_generic(mut self) -> Self {
        self.open_generic = true;
        self
    }

    pub fn instantiate(&self) -> anyhow::Result<Box<dyn Fixture>> {
        match &self.factory {
            Some(factory) => factory(),
            None => anyhow::bail!("fixture '{}' has no default constructor", self.name),
        }
    }
}

impl fmt::Debug for FixtureCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureCandidate")
            .field("name", &self.name)
            .field("is_fixture", &self.is_fixture)
            .field("hidden", &self.hidden)
            .field("open_generic", &self.open_generic)
            .field("constructible", &self.factory.is_some())
            .finish()
    }
}

/// Whether `candidate` takes part in compilation.
pub fn is_fixture_candidate(candidate: &FixtureCandidate) -> bool {
    candidate.is_fixture
        && !candidate.hidden
        && candidate.factory.is_some()
        && !candidate.open_generic
}

/// Fixture key for an implementation name: the last path segment without a
/// trailing `Fixture` and generic arguments.
pub fn fixture_key_for(name: &str) -> String {
    let base = name.split('<').next().unwrap_or(name);
    let last = base.rsplit("::").next().unwrap_or(base);
    match last.strip_suffix("Fixture") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => last.to_string(),
    }
}

/// Candidates offered by the host, in registration order.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    candidates: Vec<FixtureCandidate>,
}

impl FixtureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, candidate: FixtureCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Register a default-constructible fixture type.
    pub fn with_fixture<F: Fixture + Default + 'static>(self) -> Self {
        self.with(FixtureCandidate::of::<F>())
    }

    pub fn push(&mut self, candidate: FixtureCandidate) {
        self.candidates.push(candidate);
    }

    pub fn candidates(&self) -> &[FixtureCandidate] {
        &self.candidates
    }

    pub fn eligible(&self) -> impl Iterator<Item = &FixtureCandidate> {
        self.candidates.iter().filter(|c| is_fixture_candidate(c))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarSet;

    #[derive(Default)]
    struct MathFixture;

    impl Fixture for MathFixture {
        fn key(&self) -> &str {
            "Math"
        }

        fn grammars(&self) -> anyhow::Result<GrammarSet> {
            Ok(GrammarSet::new())
        }
    }

    #[test]
    fn test_eligibility_predicate() {
        assert!(is_fixture_candidate(&FixtureCandidate::of::<MathFixture>()));
        assert!(!is_fixture_candidate(
            &FixtureCandidate::of::<MathFixture>().hidden()
        ));
        assert!(!is_fixture_candidate(
            &FixtureCandidate::of::<MathFixture>().open_generic()
        ));
        assert!(!is_fixture_candidate(
            &FixtureCandidate::without_default_constructor("Needy")
        ));
        assert!(!is_fixture_candidate(&FixtureCandidate::other("String")));
    }

    #[test]
    fn test_catalog_filters_eligible() {
        let catalog = FixtureCatalog::new()
            .with_fixture::<MathFixture>()
            .with(FixtureCandidate::other("Helper"))
            .with(FixtureCandidate::of::<MathFixture>().hidden());
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.eligible().count(), 1);
    }

    #[test]
    fn test_fixture_key_for() {
        assert_eq!(fixture_key_for("app::fixtures::MathFixture"), "Math");
        assert_eq!(fixture_key_for("Checkout"), "Checkout");
        assert_eq!(fixture_key_for("Fixture"), "Fixture");
        assert_eq!(fixture_key_for("app::Wrapper<app::Inner>"), "Wrapper");
    }

    #[test]
    fn test_instantiate_without_factory_fails() {
        let err = FixtureCandidate::without_default_constructor("Needy")
            .instantiate()
            .err()
            .unwrap();
        assert!(err.to_string().contains("no default constructor"));
    }
}
