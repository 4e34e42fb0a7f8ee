//! The system under test and how the engine picks one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use storyline_model::{CellHandling, ExecutionContext, Specification};

use crate::error::{EngineError, Result};

/// The application a run exercises. Owned by exactly one engine.
#[async_trait]
pub trait SystemUnderTest: Send + Sync {
    fn name(&self) -> &str;

    /// Cell conversions available to every fixture of the run.
    fn cell_handling(&self) -> CellHandling {
        CellHandling::basic()
    }

    /// Bring the system up. Bounded by `startup_timeout_seconds`.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fresh context for one execution of `specification`.
    fn create_context(&self, specification: &Specification) -> anyhow::Result<ExecutionContext> {
        Ok(ExecutionContext::new(&specification.id).with_system(self.name()))
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// System used when the host registers none.
#[derive(Debug, Default)]
pub struct NulloSystem;

pub const NULLO_SYSTEM: &str = "NulloSystem";

#[async_trait]
impl SystemUnderTest for NulloSystem {
    fn name(&self) -> &str {
        NULLO_SYSTEM
    }
}

pub type SystemFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn SystemUnderTest>> + Send + Sync>;

/// A registered system type.
#[derive(Clone)]
pub struct SystemCandidate {
    pub type_name: String,
    factory: SystemFactory,
}

impl SystemCandidate {
    pub fn new<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn SystemUnderTest>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Candidate for a default-constructible system, named after its type.
    pub fn of<S: SystemUnderTest + Default + 'static>() -> Self {
        let full = std::any::type_name::<S>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short, || Ok(Box::new(S::default())))
    }

    pub fn nullo() -> Self {
        Self::of::<NulloSystem>()
    }

    /// Build the system. Factory errors keep the type name for reporting.
    pub fn instantiate(&self) -> Result<Box<dyn SystemUnderTest>> {
        (self.factory)().map_err(|e| EngineError::SystemConstruction {
            system: self.type_name.clone(),
            reason: format!("{:#}", e),
        })
    }
}

impl fmt::Debug for SystemCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCandidate")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Systems the host can run against.
#[derive(Debug, Clone, Default)]
pub struct SystemRegistry {
    candidates: Vec<SystemCandidate>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, candidate: SystemCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn with_system<S: SystemUnderTest + Default + 'static>(self) -> Self {
        self.with(SystemCandidate::of::<S>())
    }

    pub fn names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.type_name.clone()).collect()
    }

    /// Pick the system type for a run.
    ///
    /// A single candidate always wins. Otherwise a configured name selects
    /// the candidate with that name, no candidates fall back to
    /// [`NulloSystem`], and several unnamed candidates are an error.
    pub fn determine_system_type(&self, name: Option<&str>) -> Result<SystemCandidate> {
        if let [only] = self.candidates.as_slice() {
            return Ok(only.clone());
        }

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            return self
                .candidates
                .iter()
                .find(|c| c.type_name == name)
                .cloned()
                .ok_or_else(|| EngineError::SystemTypeNotFound {
                    name: name.to_string(),
                    candidates: self.names(),
                });
        }

        if self.candidates.is_empty() {
            return Ok(SystemCandidate::nullo());
        }

        Err(EngineError::IndeterminateSystemType {
            candidates: self.names(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct WebSystem;

    #[async_trait]
    impl SystemUnderTest for WebSystem {
        fn name(&self) -> &str {
            "WebSystem"
        }
    }

    #[derive(Default)]
    struct ApiSystem;

    #[async_trait]
    impl SystemUnderTest for ApiSystem {
        fn name(&self) -> &str {
            "ApiSystem"
        }
    }

    #[test]
    fn test_single_candidate_wins_even_when_named_differently() {
        let registry = SystemRegistry::new().with_system::<WebSystem>();
        let picked = registry.determine_system_type(Some("Other")).unwrap();
        assert_eq!(picked.type_name, "WebSystem");
    }

    #[test]
    fn test_named_candidate() {
        let registry = SystemRegistry::new()
            .with_system::<WebSystem>()
            .with_system::<ApiSystem>();
        let picked = registry.determine_system_type(Some("ApiSystem")).unwrap();
        assert_eq!(picked.type_name, "ApiSystem");

        match registry.determine_system_type(Some("Nope")) {
            Err(EngineError::SystemTypeNotFound { name, candidates }) => {
                assert_eq!(name, "Nope");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected SystemTypeNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_no_candidates_is_nullo() {
        let picked = SystemRegistry::new().determine_system_type(None).unwrap();
        assert_eq!(picked.type_name, NULLO_SYSTEM);
        assert_eq!(picked.instantiate().unwrap().name(), NULLO_SYSTEM);
    }

    #[test]
    fn test_several_unnamed_is_indeterminate() {
        let registry = SystemRegistry::new()
            .with_system::<WebSystem>()
            .with_system::<ApiSystem>();
        match registry.determine_system_type(None) {
            Err(EngineError::IndeterminateSystemType { candidates }) => {
                assert_eq!(candidates, vec!["WebSystem", "ApiSystem"])
            }
            other => panic!("expected IndeterminateSystemType, got {:?}", other),
        }
    }

    #[test]
    fn test_factory_error_keeps_type_name() {
        let candidate = SystemCandidate::new("Flaky", || anyhow::bail!("no database"));
        match candidate.instantiate() {
            Err(EngineError::SystemConstruction { system, reason }) => {
                assert_eq!(system, "Flaky");
                assert_eq!(reason, "no database");
            }
            _ => panic!("expected SystemConstruction"),
        }
    }

    #[test]
    fn test_default_context_names_system() {
        let context = WebSystem
            .create_context(&Specification::new("s1", "Spec"))
            .unwrap();
        assert_eq!(context.specification_id, "s1");
        assert_eq!(context.system_name.as_deref(), Some("WebSystem"));
    }
}
