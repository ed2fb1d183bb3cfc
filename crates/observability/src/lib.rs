//! Logging setup for the catalog binaries and tests.

/// Install the global subscriber using `RUST_LOG` and `LOG_FORMAT`.
///
/// Later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber construction (filter, output format).
pub mod tracing;

pub use self::tracing::{init_with, LogFormat};
