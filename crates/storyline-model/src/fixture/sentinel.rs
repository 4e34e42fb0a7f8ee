//! Stand-ins for fixtures that were never registered or failed to build.

use std::collections::BTreeMap;

use crate::grammar::{GrammarError, GrammarSet};

use super::registry::fixture_key_for;
use super::{CompiledFixture, FixtureModel, FixtureStatus};

pub fn missing_fixture_message(key: &str) -> String {
    format!("Fixture '{}' is not implemented", key)
}

impl CompiledFixture {
    /// Sentinel for an unregistered fixture key. Every grammar it resolves is
    /// a missing grammar.
    pub fn missing(key: &str) -> Self {
        Self {
            status: FixtureStatus::Missing,
            grammars: GrammarSet::new(),
            model: FixtureModel {
                key: key.to_string(),
                title: None,
                implementation: String::new(),
                grammars: BTreeMap::new(),
                errors: vec![GrammarError::new(key, missing_fixture_message(key))],
            },
        }
    }

    /// Fixture whose construction or compilation failed. The key is derived
    /// from the implementation name.
    pub fn invalid(implementation: &str, error: impl Into<String>) -> Self {
        let key = fixture_key_for(implementation);
        Self {
            status: FixtureStatus::Invalid,
            grammars: GrammarSet::new(),
            model: FixtureModel {
                key: key.clone(),
                title: None,
                implementation: implementation.to_string(),
                grammars: BTreeMap::new(),
                errors: vec![GrammarError::new(key, error)],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellHandling;
    use crate::grammar::GrammarResolution;
    use crate::step::Step;

    #[test]
    fn test_missing_fixture_resolves_missing_grammars() {
        let fixture = CompiledFixture::missing("Ghost");
        assert_eq!(fixture.key(), "Ghost");
        assert!(fixture.model().is_invalid());
        assert!(matches!(
            fixture.resolve("Anything"),
            GrammarResolution::Missing(_)
        ));

        let step = Step::new("Anything").with_id("4");
        let plan = fixture.create_plan(&step, &CellHandling::basic());
        assert_eq!(
            plan.as_invalid().map(|s| s.message.as_str()),
            Some("Grammar 'Anything' is not implemented")
        );
    }

    #[test]
    fn test_invalid_fixture_keeps_error_and_implementation() {
        let fixture = CompiledFixture::invalid("app::fixtures::BrokenFixture", "boom");
        assert_eq!(fixture.key(), "Broken");
        assert_eq!(fixture.model().implementation, "app::fixtures::BrokenFixture");
        assert_eq!(fixture.model().errors[0].error, "boom");

        let step = Step::new("Any").with_id("5");
        let plan = fixture.create_plan(&step, &CellHandling::basic());
        assert_eq!(plan.as_invalid().map(|s| s.message.as_str()), Some("boom"));
    }
}
