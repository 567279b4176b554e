//! Suppression engine.
//!
//! Decides, for each parsed defect, whether it is structurally benign. Only
//! leaks are ever eligible: invalid reads and writes, uninitialised-value use
//! and unrecognised kinds are always kept. Rules are evaluated in order and
//! the first match wins.

pub mod builtin;
pub mod engine;
pub mod matcher;
pub mod rule;
pub mod rules_file;

pub use builtin::{
    builtin_rules, DEFAULT_SKIPPED_RUNTIME_FUNCTIONS, FOREIGN_STACK_RULE, MODULE_INIT_RULE,
    RUNTIME_INTERNAL_RULE,
};
pub use engine::{RuleSet, RulesConfig, SuppressionEngine, Verdict, DEFAULT_FRAME_PREFIX};
pub use matcher::{FrameMatcher, MatchContext, ObjectMatcher, RuntimeIdentity, SymbolMatcher};
pub use rule::{Reach, RulePattern, Scope, Strictness, SuppressionRule};
pub use rules_file::{load_rules_file, parse_rules};
