//! Outcomes of many runs grouped by module.

use std::collections::BTreeMap;

use super::outcome::TestOutcome;
use crate::subject::ModuleId;

/// Collects outcomes keyed by [`ModuleId`]. Runs of the same module merge.
#[derive(Debug, Clone, Default)]
pub struct OutcomeLedger {
    outcomes: BTreeMap<ModuleId, TestOutcome>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: TestOutcome) {
        match self.outcomes.get_mut(&outcome.module) {
            Some(existing) => existing.merge(outcome),
            None => {
                self.outcomes.insert(outcome.module.clone(), outcome);
            }
        }
    }

    pub fn get(&self, module: &ModuleId) -> Option<&TestOutcome> {
        self.outcomes.get(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.values()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Modules with at least one surviving defect.
    pub fn failing(&self) -> impl Iterator<Item = &TestOutcome> {
        self.iter().filter(|o| !o.is_clean())
    }

    pub fn is_clean(&self) -> bool {
        self.failing().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Defect, DefectKind, Frame};

    fn leak_in(module: &str) -> TestOutcome {
        let mut outcome = TestOutcome::new(ModuleId::new(module), Some(0));
        outcome.unsuppressed_defects.push(Defect::new(
            DefectKind::DefinitelyLost,
            "lost",
            vec![Frame::new("memory_leak", format!("/ext/{}.so", module))],
        ));
        outcome
    }

    #[test]
    fn test_same_module_merges() {
        let mut ledger = OutcomeLedger::new();
        ledger.record(leak_in("ruby_memcheck_c_test_one"));
        ledger.record(leak_in("ruby_memcheck_c_test_one"));
        assert_eq!(ledger.len(), 1);
        let outcome = ledger.get(&ModuleId::new("ruby_memcheck_c_test_one")).unwrap();
        assert_eq!(outcome.unsuppressed_defects.len(), 2);
    }

    #[test]
    fn test_modules_kept_apart() {
        let mut ledger = OutcomeLedger::new();
        ledger.record(leak_in("ruby_memcheck_c_test_one"));
        ledger.record(TestOutcome::new(ModuleId::new("ruby_memcheck_c_test_two"), Some(0)));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.failing().count(), 1);
        assert!(!ledger.is_clean());
        assert!(ledger.get(&ModuleId::new("ruby_memcheck_c_test_two")).unwrap().is_clean());
    }
}
