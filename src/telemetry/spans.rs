//! Span utilities for harness runs.

use std::time::Duration;

use tracing::{info_span, Span};

use crate::attribution::TestOutcome;
use crate::subject::ModuleId;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record a finished run's verdict counts and duration.
    fn record_outcome(&self, outcome: &TestOutcome, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_outcome(&self, outcome: &TestOutcome, elapsed: Duration) {
        self.record("status", if outcome.is_clean() { "clean" } else { "defects" });
        self.record("defects", outcome.unsuppressed_defects.len() as u64);
        self.record("suppressed", outcome.suppressed.len() as u64);
        self.record("elapsed_ms", elapsed.as_millis() as u64);
    }
}

/// Factory for the span that wraps one analyzed run.
pub struct RunSpan;

impl RunSpan {
    /// Create a run span.
    ///
    /// `status`, `defects`, `suppressed`, `elapsed_ms` and `error.message`
    /// are filled in through [`SpanExt`] once the run finishes.
    pub fn new(run_id: &str, module: &ModuleId) -> Span {
        info_span!(
            "memcheck_run",
            run_id = %run_id,
            module = %module,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            defects = tracing::field::Empty,
            suppressed = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    }
}
