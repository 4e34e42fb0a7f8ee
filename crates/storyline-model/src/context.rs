//! Per-specification execution context handed to grammar actions.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::reporting::{RenderedReport, Report, ReportRegistry};

/// State shared by the steps of one specification run. Created by the system
/// under test and dropped once the results are reported.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub specification_id: String,
    pub system_name: Option<String>,
    state: HashMap<String, Value>,
    reports: ReportRegistry,
}

impl ExecutionContext {
    pub fn new(specification_id: impl Into<String>) -> Self {
        Self {
            specification_id: specification_id.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system_name: impl Into<String>) -> Self {
        self.system_name = Some(system_name.into());
        self
    }

    /// Seed a state entry.
    pub fn with_state<T: Serialize>(mut self, key: &str, value: T) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        self.state
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.state.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    pub fn reporter_for<T: Report + Default>(&mut self) -> &mut T {
        self.reports.reporter_for::<T>()
    }

    /// Render and clear every report produced during the run.
    pub fn take_reports(&mut self) -> Vec<RenderedReport> {
        self.reports.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        let mut context = ExecutionContext::new("spec-1").with_system("Nullo");
        context.insert("total", 12).unwrap();
        assert_eq!(context.get::<i32>("total").unwrap(), Some(12));
        assert_eq!(context.get::<i32>("absent").unwrap(), None);
        assert!(context.get::<bool>("total").is_err());
        assert_eq!(context.system_name.as_deref(), Some("Nullo"));
    }

    #[test]
    fn test_with_state_seeds_entries() {
        let context = ExecutionContext::new("spec-1")
            .with_state("user", "alice")
            .unwrap();
        assert_eq!(context.get::<String>("user").unwrap().as_deref(), Some("alice"));
    }
}
