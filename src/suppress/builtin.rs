//! Built-in suppression policy.
//!
//! Three rules are always evaluated first, in this order: allocations made
//! while the extension initializes, allocations made inside the host
//! runtime's own bookkeeping, and stacks that never enter the extension.

use regex::RegexSet;

use super::matcher::{FrameMatcher, ObjectMatcher, SymbolMatcher};
use super::rule::{Reach, Scope, SuppressionRule};
use crate::error::{HarnessError, Result};

pub const MODULE_INIT_RULE: &str = "module-init";
pub const RUNTIME_INTERNAL_RULE: &str = "runtime-internal";
pub const FOREIGN_STACK_RULE: &str = "foreign-stack";

/// Runtime functions whose allocations live for the rest of the process
/// (interned symbols, method tables, class objects, raised exceptions).
pub const DEFAULT_SKIPPED_RUNTIME_FUNCTIONS: &[&str] = &[
    r"\Aeval_string_with_cref\z",
    r"\Arb_add_method_cfunc\z",
    r"\Arb_check_funcall",
    r"\Arb_class_boot\z",
    r"\Arb_enc_raise\z",
    r"\Arb_exc_raise\z",
    r"\Arb_extend_object\z",
    r"\Arb_funcall",
    r"\Arb_intern",
    r"\Arb_ivar_set\z",
    r"\Arb_module_new\z",
    r"\Arb_raise\z",
    r"\Arb_rescue",
    r"\Arb_respond_to\z",
    r"\Arb_thread_create\z",
    r"\Arb_yield",
];

/// Leaks reached through the module's init entry point.
pub fn module_init_rule() -> Result<SuppressionRule> {
    let init = FrameMatcher::new(SymbolMatcher::InitEntry, ObjectMatcher::Extension);
    Ok(SuppressionRule::frames(MODULE_INIT_RULE, "module initialization", vec![init])?.with_scope(Scope::Anywhere))
}

/// Leaks allocated by one of `skipped` inside the host runtime.
pub fn runtime_internal_rule<S: AsRef<str>>(skipped: &[S], reach: Reach) -> Result<SuppressionRule> {
    let set = RegexSet::new(skipped.iter().map(|s| s.as_ref()))
        .map_err(|e| HarnessError::Config(format!("invalid skipped runtime function: {}", e)))?;
    let frame = FrameMatcher::new(SymbolMatcher::OneOf(set), ObjectMatcher::Runtime);
    Ok(
        SuppressionRule::frames(RUNTIME_INTERNAL_RULE, "runtime symbol interning", vec![frame])?
            .with_scope(Scope::Anywhere)
            .with_reach(reach),
    )
}

/// Leaks whose stack never enters the extension under test.
pub fn foreign_stack_rule() -> SuppressionRule {
    SuppressionRule::foreign(FOREIGN_STACK_RULE, "stack never enters the extension")
}

/// The built-in rules in evaluation order.
pub fn builtin_rules<S: AsRef<str>>(skipped: &[S], reach: Reach) -> Result<Vec<SuppressionRule>> {
    Ok(vec![
        module_init_rule()?,
        runtime_internal_rule(skipped, reach)?,
        foreign_stack_rule(),
    ])
}
