//! Process-wide tracing setup for idstore binaries.

pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};

/// Initialize tracing with the default settings (JSON, `RUST_LOG` or `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(&LogSettings::default());
}
