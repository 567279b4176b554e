//! Rule set and per-module suppression engine.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::builtin::{builtin_rules, DEFAULT_SKIPPED_RUNTIME_FUNCTIONS};
use super::matcher::{MatchContext, RuntimeIdentity};
use super::rule::{Reach, SuppressionRule};
use super::rules_file::load_rules_file;
use crate::error::{HarnessError, Result};
use crate::report::Defect;
use crate::subject::ModuleId;

/// Default number of innermost frames inspected by anchored rules.
pub const DEFAULT_FRAME_PREFIX: usize = 12;

/// Inputs for building a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct RulesConfig {
    pub builtin_rules: bool,
    pub skipped_runtime_functions: Vec<String>,
    pub runtime_reach: Reach,
    pub frame_prefix: usize,
    pub rules_file: Option<PathBuf>,
    /// Host runtime executable, a path or a bare name.
    pub runtime_binary: String,
    /// Regexes over file names of the runtime's shared libraries.
    pub runtime_objects: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            builtin_rules: true,
            skipped_runtime_functions: DEFAULT_SKIPPED_RUNTIME_FUNCTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            runtime_reach: Reach::Unreachable,
            frame_prefix: DEFAULT_FRAME_PREFIX,
            rules_file: None,
            runtime_binary: "ruby".to_string(),
            runtime_objects: vec![r"^libruby\.so".to_string()],
        }
    }
}

/// Immutable, ordered rules shared by every run of a harness process.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<SuppressionRule>,
    frame_prefix: usize,
    runtime: RuntimeIdentity,
}

impl RuleSet {
    /// An empty rule set.
    pub fn new(runtime: RuntimeIdentity, frame_prefix: usize) -> Self {
        Self {
            rules: Vec::new(),
            frame_prefix: frame_prefix.max(1),
            runtime,
        }
    }

    /// Append `rule`. Names must be unique across the set.
    pub fn push(&mut self, rule: SuppressionRule) -> Result<()> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(HarnessError::Config(format!("duplicate rule name {:?}", rule.name())));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn with_rule(mut self, rule: SuppressionRule) -> Result<Self> {
        self.push(rule)?;
        Ok(self)
    }

    /// Built-in rules followed by the rules file, if one is configured.
    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        let runtime = RuntimeIdentity::new(config.runtime_binary.clone(), &config.runtime_objects)?;
        let mut set = Self::new(runtime, config.frame_prefix);
        if config.builtin_rules {
            for rule in builtin_rules(config.skipped_runtime_functions.as_slice(), config.runtime_reach)? {
                set.push(rule)?;
            }
        }
        if let Some(path) = &config.rules_file {
            let user = load_rules_file(path)?;
            tracing::info!(path = %path.display(), rules = user.len(), "Loaded rules file");
            for rule in user {
                set.push(rule)?;
            }
        }
        Ok(set)
    }

    /// The default built-in policy.
    pub fn builtin() -> Result<Self> {
        Self::from_config(&RulesConfig::default())
    }

    pub fn rules(&self) -> &[SuppressionRule] {
        &self.rules
    }

    pub fn frame_prefix(&self) -> usize {
        self.frame_prefix
    }

    pub fn runtime(&self) -> &RuntimeIdentity {
        &self.runtime
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> HashSet<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

/// Decision for one defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Kept,
    Suppressed { rule: String, reason: String },
}

impl Verdict {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed { .. })
    }
}

/// Evaluates defects of one module against a shared [`RuleSet`].
#[derive(Debug, Clone)]
pub struct SuppressionEngine {
    rules: Arc<RuleSet>,
    module: ModuleId,
}

impl SuppressionEngine {
    pub fn new(rules: Arc<RuleSet>, module: ModuleId) -> Self {
        Self { rules, module }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// First matching rule wins; no match keeps the defect.
    pub fn evaluate(&self, defect: &Defect) -> Verdict {
        if !defect.kind.is_leak() {
            return Verdict::Kept;
        }
        let ctx = MatchContext {
            module: &self.module,
            runtime: self.rules.runtime(),
        };
        self.rules
            .rules()
            .iter()
            .find(|rule| rule.matches(defect, self.rules.frame_prefix(), &ctx))
            .map_or(Verdict::Kept, |rule| Verdict::Suppressed {
                rule: rule.name().to_string(),
                reason: rule.reason().to_string(),
            })
    }

    /// Evaluate every defect, preserving order.
    pub fn evaluate_all(&self, defects: Vec<Defect>) -> Vec<(Defect, Verdict)> {
        defects
            .into_iter()
            .map(|d| {
                let verdict = self.evaluate(&d);
                (d, verdict)
            })
            .collect()
    }
}
