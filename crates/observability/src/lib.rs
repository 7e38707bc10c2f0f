//! Tracing and logging (shared setup).

/// Initialize process-wide tracing with the `info` default filter.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with("info");
}

/// Initialize process-wide tracing; `default_directive` applies when `RUST_LOG` is unset.
pub fn init_with(default_directive: &str) {
    tracing::init_with(default_directive);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
