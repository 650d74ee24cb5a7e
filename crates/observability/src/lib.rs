//! Process-wide tracing setup shared by kinship binaries and tests.

pub mod tracing;

pub use crate::tracing::{LogFormat, TracingConfig};

/// Initialize tracing from the environment (`RUST_LOG`, `KINSHIP_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(TracingConfig::from_env());
}

/// Subscriber for tests: compact output captured by the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}
