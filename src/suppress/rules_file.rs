//! TOML rules file.
//!
//! ```toml
//! [[rule]]
//! name = "openssl-error-strings"
//! reason = "OpenSSL caches error strings for the process lifetime"
//! scope = "anchored"
//! strictness = "subsequence"
//! reach = "any"
//! frames = [
//!   { symbol = "^CRYPTO_zalloc$" },
//!   { symbol = "^ERR_load_.*", object = "libcrypto" },
//! ]
//! ```
//!
//! A rule with `foreign = true` and no frames matches stacks that never enter
//! the extension. `kinds` narrows a rule to some leak kinds; naming any other
//! kind is a load error.

use std::path::Path;

use serde::Deserialize;

use super::matcher::{FrameMatcher, ObjectMatcher, SymbolMatcher};
use super::rule::{Reach, Scope, Strictness, SuppressionRule};
use crate::error::{HarnessError, Result};
use crate::report::DefectKind;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    name: String,
    reason: String,
    #[serde(default)]
    scope: Scope,
    #[serde(default)]
    strictness: Strictness,
    #[serde(default)]
    reach: Reach,
    #[serde(default)]
    foreign: bool,
    #[serde(default)]
    frames: Vec<FrameEntry>,
    #[serde(default)]
    kinds: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrameEntry {
    symbol: Option<String>,
    object: Option<String>,
}

impl FrameEntry {
    fn into_matcher(self) -> Result<FrameMatcher> {
        let symbol = match self.symbol.as_deref() {
            Some(s) => SymbolMatcher::parse(s)?,
            None => SymbolMatcher::Any,
        };
        let object = match self.object.as_deref() {
            Some(o) => ObjectMatcher::parse(o)?,
            None => ObjectMatcher::Any,
        };
        Ok(FrameMatcher::new(symbol, object))
    }
}

impl RuleEntry {
    fn into_rule(self) -> Result<SuppressionRule> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::Config("rule with an empty name".into()));
        }
        if self.reason.trim().is_empty() {
            return Err(HarnessError::Config(format!("rule {:?} has no reason", self.name)));
        }

        let rule = if self.foreign {
            if !self.frames.is_empty() {
                return Err(HarnessError::Config(format!(
                    "rule {:?} is foreign and cannot list frames",
                    self.name
                )));
            }
            SuppressionRule::foreign(self.name, self.reason)
        } else {
            let frames = self
                .frames
                .into_iter()
                .map(FrameEntry::into_matcher)
                .collect::<Result<Vec<_>>>()?;
            SuppressionRule::frames(self.name, self.reason, frames)?
                .with_scope(self.scope)
                .with_strictness(self.strictness)
        };
        let rule = rule.with_reach(self.reach);

        match self.kinds {
            Some(names) => {
                let kinds = names
                    .iter()
                    .map(|n| {
                        DefectKind::from_name(n).ok_or_else(|| {
                            HarnessError::Config(format!("rule {:?}: unknown kind {:?}", rule.name(), n))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                rule.with_kinds(kinds)
            }
            None => Ok(rule),
        }
    }
}

/// Parse rules from TOML text, in file order.
pub fn parse_rules(text: &str) -> Result<Vec<SuppressionRule>> {
    let file: RulesFile =
        toml::from_str(text).map_err(|e| HarnessError::Config(format!("invalid rules file: {}", e)))?;
    file.rules.into_iter().map(RuleEntry::into_rule).collect()
}

/// Read and parse a rules file.
pub fn load_rules_file(path: &Path) -> Result<Vec<SuppressionRule>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::Config(format!("cannot read rules file {}: {}", path.display(), e)))?;
    parse_rules(&text).map_err(|e| match e {
        HarnessError::Config(msg) => HarnessError::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppress::rule::RulePattern;

    const SAMPLE: &str = r#"
[[rule]]
name = "openssl-error-strings"
reason = "OpenSSL caches error strings for the process lifetime"
scope = "anywhere"
strictness = "exact"
frames = [
  { symbol = "^CRYPTO_zalloc$" },
  { symbol = "^ERR_load_.*", object = "libcrypto" },
]

[[rule]]
name = "foreign-indirect"
reason = "indirect leaks outside the extension"
foreign = true
kinds = ["indirectly_lost"]
"#;

    #[test]
    fn test_parse_sample() {
        let rules = parse_rules(SAMPLE).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), "openssl-error-strings");
        match rules[0].pattern() {
            RulePattern::Frames { frames, scope, strictness } => {
                assert_eq!(frames.len(), 2);
                assert_eq!(*scope, Scope::Anywhere);
                assert_eq!(*strictness, Strictness::Exact);
            }
            RulePattern::Foreign => panic!("expected frames"),
        }
        assert!(matches!(rules[1].pattern(), RulePattern::Foreign));
    }

    #[test]
    fn test_defaults() {
        let rules = parse_rules(
            r#"
[[rule]]
name = "r"
reason = "x"
frames = [{ symbol = "@init", object = "@extension" }]
"#,
        )
        .unwrap();
        match rules[0].pattern() {
            RulePattern::Frames { scope, strictness, .. } => {
                assert_eq!(*scope, Scope::Anchored);
                assert_eq!(*strictness, Strictness::Subsequence);
            }
            RulePattern::Foreign => panic!("expected frames"),
        }
        assert_eq!(rules[0].reach(), Reach::Any);
    }

    #[test]
    fn test_rejects_non_leak_kind() {
        let err = parse_rules(
            r#"
[[rule]]
name = "hide-uaf"
reason = "nope"
frames = [{ symbol = "use_after_free" }]
kinds = ["invalid_write"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("can never be suppressed"));
    }

    #[test]
    fn test_rejects_unknown_kind_and_fields() {
        assert!(parse_rules("[[rule]]\nname = \"r\"\nreason = \"x\"\nforeign = true\nkinds = [\"Leak_PossiblyLost\"]\n").is_err());
        assert!(parse_rules("[[rule]]\nname = \"r\"\nreason = \"x\"\nforeign = true\ncolour = \"red\"\n").is_err());
    }

    #[test]
    fn test_rejects_missing_reason_and_frames() {
        assert!(parse_rules("[[rule]]\nname = \"r\"\nreason = \"\"\nforeign = true\n").is_err());
        assert!(parse_rules("[[rule]]\nname = \"r\"\nreason = \"x\"\n").is_err());
    }

    #[test]
    fn test_rejects_bad_regex() {
        assert!(parse_rules("[[rule]]\nname = \"r\"\nreason = \"x\"\nframes = [{ symbol = \"(\" }]\n").is_err());
    }

    #[test]
    fn test_empty_file_has_no_rules() {
        assert!(parse_rules("").unwrap().is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_rules_file(&path).unwrap().len(), 2);

        let missing = load_rules_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.is_fatal());
    }
}
