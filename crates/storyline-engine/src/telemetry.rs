//! Tracing initialisation for hosts and the isolated engine thread.
//!
//! The global subscriber can only be set once per process; later calls
//! are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::project::{Project, TracingStyle};

/// Install a subscriber writing in `style`. `level` applies when `RUST_LOG`
/// is not set.
pub fn init_tracing(style: TracingStyle, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let text = (!style.is_json())
        .then(|| fmt::layer().with_target(false).with_ansi(style.is_ansi()));
    let json = style
        .is_json()
        .then(|| fmt::layer().with_target(false).json());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .try_init()
        .ok();
}

pub fn init_for_project(project: &Project) {
    init_tracing(project.tracing_style, Level::INFO);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(TracingStyle::Ci, Level::DEBUG);
        init_for_project(&Project::default());
    }
}
