//! Attribution of verdicts into per-run outcomes.
//!
//! The attributor only sorts defects into kept and suppressed; deciding
//! whether a run passes is left to the caller via [`TestOutcome::is_clean`].

mod ledger;
mod outcome;
mod render;

pub use ledger::OutcomeLedger;
pub use outcome::{SuppressedDefect, TestOutcome, DEFECTS_REPORTED_MSG};
pub use render::{render_defect, EXTENSION_FRAME_MARKER};

use crate::report::Defect;
use crate::subject::ModuleId;
use crate::suppress::{Verdict, DEFAULT_FRAME_PREFIX};

/// Builds a [`TestOutcome`] from evaluated defects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attributor;

impl Attributor {
    pub fn new() -> Self {
        Self
    }

    pub fn attribute(
        &self,
        module: &ModuleId,
        exit_code: Option<i32>,
        evaluated: Vec<(Defect, Verdict)>,
    ) -> TestOutcome {
        let mut outcome = TestOutcome::new(module.clone(), exit_code);
        for (defect, verdict) in evaluated {
            match verdict {
                Verdict::Kept => {
                    if defect.is_unresolved(DEFAULT_FRAME_PREFIX) {
                        tracing::warn!(
                            module = %module,
                            kind = %defect.kind,
                            "Unsuppressed defect has no resolved frames; build the extension with debug info"
                        );
                    }
                    tracing::warn!(
                        module = %module,
                        kind = %defect.kind,
                        frame = %defect.innermost(),
                        "Unsuppressed defect"
                    );
                    outcome.unsuppressed_defects.push(defect);
                }
                Verdict::Suppressed { rule, reason } => {
                    tracing::info!(
                        module = %module,
                        kind = %defect.kind,
                        rule = %rule,
                        reason = %reason,
                        "Suppressed defect"
                    );
                    outcome.suppressed.push(SuppressedDefect { defect, rule, reason });
                }
            }
        }
        outcome
    }
}
