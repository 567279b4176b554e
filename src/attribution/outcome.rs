//! Per-run outcome.

use serde::Serialize;

use super::render::render_defect;
use crate::report::Defect;
use crate::subject::ModuleId;

/// Headline of a failure message.
pub const DEFECTS_REPORTED_MSG: &str =
    "Memcheck reported memory defects in the extension under test (lines starting with ' *' are extension frames)";

/// A defect that a rule declared benign, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressedDefect {
    pub defect: Defect,
    pub rule: String,
    pub reason: String,
}

/// Result of judging one analyzed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub module: ModuleId,
    /// Exit code of the analyzed subject, if it exited normally.
    pub exit_code: Option<i32>,
    /// Defects no rule suppressed, in report order.
    pub unsuppressed_defects: Vec<Defect>,
    pub suppressed: Vec<SuppressedDefect>,
}

impl TestOutcome {
    pub fn new(module: ModuleId, exit_code: Option<i32>) -> Self {
        Self {
            module,
            exit_code,
            unsuppressed_defects: Vec::new(),
            suppressed: Vec::new(),
        }
    }

    /// Returns true if no defect survived suppression.
    pub fn is_clean(&self) -> bool {
        self.unsuppressed_defects.is_empty()
    }

    /// Failure text for every surviving defect, or `None` when clean.
    pub fn failure_message(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let mut out = format!(
            "{} [{}: {} defect(s)]\n",
            DEFECTS_REPORTED_MSG,
            self.module,
            self.unsuppressed_defects.len()
        );
        for defect in &self.unsuppressed_defects {
            out.push('\n');
            out.push_str(&render_defect(defect, &self.module));
        }
        Some(out)
    }

    /// Fold another run of the same module into this outcome.
    pub fn merge(&mut self, other: TestOutcome) {
        self.unsuppressed_defects.extend(other.unsuppressed_defects);
        self.suppressed.extend(other.suppressed);
        if self.exit_code == Some(0) || self.exit_code.is_none() {
            self.exit_code = other.exit_code.or(self.exit_code);
        }
    }
}
