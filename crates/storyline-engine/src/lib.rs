//! Storyline Engine
//!
//! Runs specifications against a system under test:
//! - a single-worker [`SpecificationEngine`] with stop conditions
//! - interactive and batch runners with bounded retry
//! - the [`RemoteProxy`] isolation boundary and its JSON message bus
//! - tracing setup, lifecycle events and counters

pub mod batch;
pub mod controller;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod obs;
pub mod project;
pub mod remote;
pub mod request;
pub mod results;
pub mod runner;
pub mod stop_conditions;
pub mod system;
pub mod telemetry;

pub use batch::{BatchObserver, BatchRecord, BatchRecorder};
pub use controller::{BatchController, EngineController};
pub use engine::{EngineMode, EngineStarted, SpecificationEngine};
pub use error::{EngineError, RemoteError, Result};
pub use messaging::{EventAggregator, Message, MessageListener, RemoteListener, SystemRecycled};
pub use metrics::EngineMetrics;
pub use project::{Project, TracingStyle};
pub use remote::{BatchDecorator, RemoteProxy};
pub use request::SpecExecutionRequest;
pub use results::SpecResults;
pub use runner::{
    BatchRunner, Completion, InstrumentedRunner, RetryPolicy, Runner, UserInterfaceObserver,
};
pub use stop_conditions::StopConditions;
pub use system::{
    NulloSystem, SystemCandidate, SystemFactory, SystemRegistry, SystemUnderTest, NULLO_SYSTEM,
};
pub use telemetry::{init_for_project, init_tracing};
