//! Per-engine atomic counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`EngineMetrics::flush`] to emit current values as a single
//! `tracing::info!` event, which the engine does at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    executed: AtomicU64,
    requeued: AtomicU64,
    aborted: AtomicU64,
}

impl EngineMetrics {
    pub const fn new() -> Self {
        Self {
            executed: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub fn inc_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "specs_executed", "counter incremented");
    }

    pub fn inc_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "specs_requeued", "counter incremented");
    }

    pub fn inc_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "specs_aborted", "counter incremented");
    }

    pub fn flush(&self, system: &str) {
        tracing::info!(
            metric = "flush",
            system = %system,
            specs_executed = self.executed(),
            specs_requeued = self.requeued(),
            specs_aborted = self.aborted(),
        );
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }
}
