//! Suppression rules.
//!
//! A rule is a predicate over a defect's stack. Frame sequences are matched
//! either contiguously (`Exact`) or as a subsequence that tolerates frames the
//! compiler elided or merged (`Subsequence`).

use serde::Deserialize;

use super::matcher::{FrameMatcher, MatchContext};
use crate::error::{HarnessError, Result};
use crate::report::{Defect, DefectKind, Frame};

/// Where a frame sequence may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// The first matcher must match the innermost frame. Only the
    /// configured frame prefix is inspected.
    #[default]
    Anchored,
    /// The sequence may start at any depth of the captured stack.
    Anywhere,
}

/// How strictly consecutive matchers map onto consecutive frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Matchers map onto adjacent frames.
    Exact,
    /// Other frames may sit between matched frames.
    #[default]
    Subsequence,
}

/// Condition on whether the extension's own code reaches the matched frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reach {
    /// No condition.
    #[default]
    Any,
    /// No frame of the captured stack belongs to the extension under test.
    Unreachable,
    /// Every matched frame is inner to every extension frame.
    CalleeOfExtension,
}

impl Reach {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "any" => Some(Self::Any),
            "unreachable" => Some(Self::Unreachable),
            "callee-of-extension" => Some(Self::CalleeOfExtension),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Unreachable => "unreachable",
            Self::CalleeOfExtension => "callee-of-extension",
        }
    }

    /// `outermost_match` is the index of the outermost matched frame.
    fn allows(&self, stack: &[Frame], outermost_match: usize, ctx: &MatchContext<'_>) -> bool {
        match self {
            Self::Any => true,
            Self::Unreachable => !stack.iter().any(|f| ctx.module.owns(f)),
            Self::CalleeOfExtension => match stack.iter().position(|f| ctx.module.owns(f)) {
                Some(first_extension) => outermost_match < first_extension,
                None => true,
            },
        }
    }
}

/// What a rule looks for in a stack.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Frames {
        frames: Vec<FrameMatcher>,
        scope: Scope,
        strictness: Strictness,
    },
    /// The stack never enters the extension under test and every frame has
    /// a known object.
    Foreign,
}

impl RulePattern {
    /// Index of the outermost matched frame, if the pattern matches.
    fn find(&self, stack: &[Frame], prefix: usize, ctx: &MatchContext<'_>) -> Option<usize> {
        match self {
            Self::Foreign => {
                let foreign = stack
                    .iter()
                    .all(|f| f.module_path.is_some() && !ctx.module.owns(f));
                foreign.then_some(0)
            }
            Self::Frames {
                frames,
                scope,
                strictness,
            } => {
                let window = match scope {
                    Scope::Anchored => &stack[..prefix.min(stack.len())],
                    Scope::Anywhere => stack,
                };
                match (scope, strictness) {
                    (Scope::Anchored, Strictness::Exact) => match_exact_at(frames, window, 0, ctx),
                    (Scope::Anchored, Strictness::Subsequence) => {
                        let first = frames.first()?;
                        if !first.matches(window.first()?, ctx) {
                            return None;
                        }
                        if frames.len() == 1 {
                            return Some(0);
                        }
                        match_subsequence(&frames[1..], window, 1, ctx)
                    }
                    (Scope::Anywhere, Strictness::Exact) => {
                        (0..window.len()).find_map(|start| match_exact_at(frames, window, start, ctx))
                    }
                    (Scope::Anywhere, Strictness::Subsequence) => {
                        match_subsequence(frames, window, 0, ctx)
                    }
                }
            }
        }
    }
}

fn match_exact_at(
    matchers: &[FrameMatcher],
    frames: &[Frame],
    start: usize,
    ctx: &MatchContext<'_>,
) -> Option<usize> {
    let end = start + matchers.len();
    if matchers.is_empty() || end > frames.len() {
        return None;
    }
    matchers
        .iter()
        .zip(&frames[start..end])
        .all(|(m, f)| m.matches(f, ctx))
        .then_some(end - 1)
}

/// Greedy earliest subsequence match; returns the index of the last matched
/// frame. An empty matcher list matches nothing.
fn match_subsequence(
    matchers: &[FrameMatcher],
    frames: &[Frame],
    from: usize,
    ctx: &MatchContext<'_>,
) -> Option<usize> {
    if matchers.is_empty() {
        return None;
    }
    let mut last = None;
    let mut next = from;
    for matcher in matchers {
        let offset = frames.get(next..)?.iter().position(|f| matcher.matches(f, ctx))?;
        last = Some(next + offset);
        next += offset + 1;
    }
    last
}

/// A named, explained predicate declaring a class of defects benign.
#[derive(Debug, Clone)]
pub struct SuppressionRule {
    name: String,
    reason: String,
    pattern: RulePattern,
    reach: Reach,
    kinds: Vec<DefectKind>,
}

impl SuppressionRule {
    /// A frame-sequence rule, anchored with subsequence matching by default.
    pub fn frames(
        name: impl Into<String>,
        reason: impl Into<String>,
        frames: Vec<FrameMatcher>,
    ) -> Result<Self> {
        let name = name.into();
        if frames.is_empty() {
            return Err(HarnessError::Config(format!("rule {:?} has no frame matchers", name)));
        }
        Ok(Self {
            name,
            reason: reason.into(),
            pattern: RulePattern::Frames {
                frames,
                scope: Scope::default(),
                strictness: Strictness::default(),
            },
            reach: Reach::Any,
            kinds: leak_kinds(),
        })
    }

    /// A rule matching stacks that never enter the extension under test.
    pub fn foreign(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            pattern: RulePattern::Foreign,
            reach: Reach::Any,
            kinds: leak_kinds(),
        }
    }

    pub fn with_scope(mut self, new_scope: Scope) -> Self {
        if let RulePattern::Frames { scope, .. } = &mut self.pattern {
            *scope = new_scope;
        }
        self
    }

    pub fn with_strictness(mut self, new_strictness: Strictness) -> Self {
        if let RulePattern::Frames { strictness, .. } = &mut self.pattern {
            *strictness = new_strictness;
        }
        self
    }

    pub fn with_reach(mut self, reach: Reach) -> Self {
        self.reach = reach;
        self
    }

    /// Restrict the rule to `kinds`. Only leak kinds are accepted.
    pub fn with_kinds(mut self, kinds: Vec<DefectKind>) -> Result<Self> {
        if let Some(bad) = kinds.iter().find(|k| !k.is_leak()) {
            return Err(HarnessError::Config(format!(
                "rule {:?} targets {}, which can never be suppressed",
                self.name, bad
            )));
        }
        if kinds.is_empty() {
            return Err(HarnessError::Config(format!("rule {:?} lists no kinds", self.name)));
        }
        self.kinds = kinds;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn reach(&self) -> Reach {
        self.reach
    }

    pub fn pattern(&self) -> &RulePattern {
        &self.pattern
    }

    /// Returns true if this rule declares `defect` benign.
    ///
    /// Non-leak defects never match, whatever the rule says.
    pub fn matches(&self, defect: &Defect, prefix: usize, ctx: &MatchContext<'_>) -> bool {
        if !defect.kind.is_leak() || !self.kinds.contains(&defect.kind) {
            return false;
        }
        match self.pattern.find(&defect.stack, prefix, ctx) {
            Some(outermost) => self.reach.allows(&defect.stack, outermost, ctx),
            None => false,
        }
    }
}

fn leak_kinds() -> Vec<DefectKind> {
    vec![DefectKind::DefinitelyLost, DefectKind::IndirectlyLost]
}
