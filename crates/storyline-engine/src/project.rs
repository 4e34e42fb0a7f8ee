//! Project configuration record handed to the engine by the host.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::stop_conditions::StopConditions;

/// Log output style of the isolated side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingStyle {
    #[default]
    Standard,
    Json,
    /// Plain output for CI log collectors.
    Ci,
}

impl TracingStyle {
    pub fn is_json(&self) -> bool {
        matches!(self, TracingStyle::Json)
    }

    /// Colour codes only for interactive terminals.
    pub fn is_ansi(&self) -> bool {
        matches!(self, TracingStyle::Standard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Name of the system under test; required when several are registered.
    pub system_type_name: Option<String>,
    /// Default per-specification timeout. Zero disables it.
    pub timeout_seconds: u64,
    pub tracing_style: TracingStyle,
    pub config_file: Option<String>,
    pub profile: Option<String>,
    pub stop_conditions: StopConditions,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            system_type_name: None,
            timeout_seconds: 60,
            tracing_style: TracingStyle::default(),
            config_file: None,
            profile: None,
            stop_conditions: StopConditions::default(),
        }
    }
}

impl Project {
    /// Parse and validate a project record.
    pub fn from_json(json: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(json)?;
        project.validate()?;
        Ok(project)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stop_conditions.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "stop_conditions.max_attempts must be at least 1".to_string(),
            ));
        }
        if matches!(&self.system_type_name, Some(name) if name.trim().is_empty()) {
            return Err(EngineError::InvalidConfig(
                "system_type_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Stop conditions with the project timeout filled in for whichever of
    /// the specification and startup limits they leave unset.
    pub fn effective_stop_conditions(&self) -> StopConditions {
        let mut stop = self.stop_conditions.clone();
        if self.timeout_seconds > 0 {
            stop.timeout_seconds.get_or_insert(self.timeout_seconds);
            stop.startup_timeout_seconds.get_or_insert(self.timeout_seconds);
        }
        stop
    }
}
