//! Error types for the engine and the isolation boundary.

use storyline_model::ModelError;

/// Errors that prevent the engine from running.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "cannot determine the system under test, set system_type_name to one of: {}",
        .candidates.join(", ")
    )]
    IndeterminateSystemType { candidates: Vec<String> },

    #[error("system type '{name}' not found among: {}", .candidates.join(", "))]
    SystemTypeNotFound {
        name: String,
        candidates: Vec<String>,
    },

    #[error("system '{system}' could not be created: {reason}")]
    SystemConstruction { system: String, reason: String },

    #[error("system '{system}' did not warm up within {limit_secs}s")]
    StartupTimeout { system: String, limit_secs: u64 },

    #[error("system '{system}' failed to start: {reason}")]
    Startup { system: String, reason: String },

    #[error("engine already started")]
    AlreadyStarted,

    #[error("engine is not running")]
    NotRunning,

    #[error("invalid project configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Misuse of the isolation boundary. Startup failures never surface here;
/// they are reported as `SystemRecycled` messages.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote engine is not started")]
    NotStarted,

    #[error("remote engine already started")]
    AlreadyStarted,

    #[error("remote engine has been disposed")]
    Disposed,

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("isolation thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
}
