//! Structured observability hooks for specification lifecycle events.
//!
//! - `SpecSpan` RAII guard for synchronous step execution
//! - [`spec_span`] for instrumenting async execution
//! - emission functions for started, requeued, handled, recycled and
//!   compiled events, all at `info!` unless noted

use tracing::{info, warn, Span};

/// RAII guard that enters a specification-scoped span.
///
/// Not `Send`; hold it only in synchronous code such as a blocking step.
pub struct SpecSpan {
    _span: tracing::span::EnteredSpan,
}

impl SpecSpan {
    pub fn enter(specification_id: &str, attempt: u32) -> Self {
        Self {
            _span: spec_span(specification_id, attempt).entered(),
        }
    }
}

/// Span for one execution of a specification.
pub fn spec_span(specification_id: &str, attempt: u32) -> Span {
    tracing::info_span!("storyline.spec", spec_id = %specification_id, attempt = attempt)
}

pub fn emit_spec_started(specification_id: &str, attempt: u32) {
    info!(event = "spec.started", spec_id = %specification_id, attempt = attempt);
}

pub fn emit_spec_requeued(specification_id: &str, attempts: u32, max_attempts: u32) {
    info!(
        event = "spec.requeued",
        spec_id = %specification_id,
        attempts = attempts,
        max_attempts = max_attempts,
    );
}

pub fn emit_spec_handled(specification_id: &str, attempts: u32, success: bool) {
    info!(
        event = "spec.handled",
        spec_id = %specification_id,
        attempts = attempts,
        success = success,
    );
}

/// Emit event: the isolated side started, or failed to (warning level).
pub fn emit_system_recycled(success: bool, system_name: Option<&str>, error: Option<&str>) {
    let system = system_name.unwrap_or("<unresolved>");
    if success {
        info!(event = "system.recycled", success = true, system = %system);
    } else {
        warn!(
            event = "system.recycled",
            success = false,
            system = %system,
            error = error.unwrap_or(""),
        );
    }
}

pub fn emit_fixtures_compiled(fixtures: usize, invalid: usize, elapsed_ms: u64) {
    info!(
        event = "fixtures.compiled",
        fixtures = fixtures,
        invalid = invalid,
        elapsed_ms = elapsed_ms,
    );
}
