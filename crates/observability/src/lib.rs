//! Tracing and logging setup shared by binaries embedding the workshop core.

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(&self::tracing::TracingConfig::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, TracingConfig};
