//! Process-wide tracing/logging setup.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use tracing::{LOG_FORMAT_VAR, LogFormat};

/// Initialize process-wide logging, format taken from `HRDESK_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Initialize with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
