//! Storyline CI - build-server reporting for batch runs
//!
//! Provides:
//! - `CiBatchObserver`, which decorates any batch observer
//! - classification of terminal results into finished/ignored/failed
//! - a gate deciding whether a finished batch breaks the build

pub mod gate;
pub mod observer;
pub mod outcome;
pub mod sink;

pub use gate::{CiGate, GateVerdict};
pub use observer::{ci_decorator, CiBatchObserver};
pub use outcome::{escape_ci_text, CiOutcome};
pub use sink::{CiSink, CollectingSink, TracingSink};
