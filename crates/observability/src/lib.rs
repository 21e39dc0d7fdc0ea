//! Process-wide logging setup and log hygiene helpers.

pub mod redact;
pub mod subscriber;

pub use redact::{log_error, redact};

/// Initialize tracing with JSON output, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    subscriber::init("info");
}
