//! Tracing and logging setup shared by the binaries.

pub mod tracing;

pub use tracing::LogFormat;

/// Initialize process-wide tracing with JSON output.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Like [`init`] with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
