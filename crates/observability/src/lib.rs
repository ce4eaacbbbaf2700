//! Process-wide tracing setup.

pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};

/// Initialize tracing with JSON output, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::install(&LogSettings::default());
}

/// Like [`init`], with explicit settings. Returns `false` if a global
/// subscriber was already installed.
pub fn init_with(settings: &LogSettings) -> bool {
    subscriber::install(settings)
}
