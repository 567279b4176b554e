//! Telemetry for harness runs.
//!
//! Structured logging through `tracing`, plus the per-run span that carries
//! the run's identity and verdict counts.

mod logging;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{RunSpan, SpanExt};
