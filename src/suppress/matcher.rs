//! Frame matchers and the host-runtime identity they match against.

use std::path::Path;

use regex::{Regex, RegexSet};

use crate::error::{HarnessError, Result};
use crate::report::Frame;
use crate::subject::ModuleId;

/// Identifies frames that execute inside the host runtime.
#[derive(Debug, Clone)]
pub struct RuntimeIdentity {
    binary: String,
    objects: RegexSet,
}

impl RuntimeIdentity {
    /// `binary` is the runtime executable (a path or a bare name);
    /// `object_patterns` match file names of its shared libraries.
    pub fn new<I, S>(binary: impl Into<String>, object_patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let objects = RegexSet::new(object_patterns)
            .map_err(|e| HarnessError::Config(format!("invalid runtime object pattern: {}", e)))?;
        Ok(Self {
            binary: binary.into(),
            objects,
        })
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Returns true if `frame` executes in the runtime binary or one of its
    /// shared libraries.
    pub fn contains(&self, frame: &Frame) -> bool {
        let Some(obj) = frame.module_path.as_deref() else {
            return false;
        };
        if obj == self.binary {
            return true;
        }
        let binary_name = Path::new(&self.binary).file_name().and_then(|n| n.to_str());
        match frame.object_name() {
            Some(name) => binary_name == Some(name) || self.objects.is_match(name),
            None => false,
        }
    }
}

/// Everything a matcher needs to know about the run being judged.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub module: &'a ModuleId,
    pub runtime: &'a RuntimeIdentity,
}

/// Matches a frame's symbol.
#[derive(Debug, Clone)]
pub enum SymbolMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
    OneOf(RegexSet),
    /// The init entry point of the module under test.
    InitEntry,
}

impl SymbolMatcher {
    /// Parse the rules-file syntax: `@init`, `*`, or a regex.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "*" => Ok(Self::Any),
            "@init" => Ok(Self::InitEntry),
            pattern => Regex::new(pattern)
                .map(Self::Pattern)
                .map_err(|e| HarnessError::Config(format!("invalid symbol pattern {:?}: {}", pattern, e))),
        }
    }

    pub fn matches(&self, frame: &Frame, ctx: &MatchContext<'_>) -> bool {
        let symbol = frame.symbol.as_deref();
        match self {
            Self::Any => true,
            Self::Exact(name) => symbol == Some(name.as_str()),
            Self::Pattern(re) => symbol.is_some_and(|s| re.is_match(s)),
            Self::OneOf(set) => symbol.is_some_and(|s| set.is_match(s)),
            Self::InitEntry => symbol == Some(ctx.module.init_symbol()),
        }
    }
}

/// Matches the object (binary or shared library) a frame executes in.
#[derive(Debug, Clone)]
pub enum ObjectMatcher {
    Any,
    /// The extension under test.
    Extension,
    /// The host runtime.
    Runtime,
    Pattern(Regex),
}

impl ObjectMatcher {
    /// Parse the rules-file syntax: `@extension`, `@runtime`, `*`, or a regex.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "*" => Ok(Self::Any),
            "@extension" => Ok(Self::Extension),
            "@runtime" => Ok(Self::Runtime),
            pattern => Regex::new(pattern)
                .map(Self::Pattern)
                .map_err(|e| HarnessError::Config(format!("invalid object pattern {:?}: {}", pattern, e))),
        }
    }

    pub fn matches(&self, frame: &Frame, ctx: &MatchContext<'_>) -> bool {
        match self {
            Self::Any => true,
            Self::Extension => ctx.module.owns(frame),
            Self::Runtime => ctx.runtime.contains(frame),
            Self::Pattern(re) => frame.module_path.as_deref().is_some_and(|p| re.is_match(p)),
        }
    }
}

/// One element of a rule's frame sequence.
#[derive(Debug, Clone)]
pub struct FrameMatcher {
    pub symbol: SymbolMatcher,
    pub object: ObjectMatcher,
}

impl FrameMatcher {
    pub fn new(symbol: SymbolMatcher, object: ObjectMatcher) -> Self {
        Self { symbol, object }
    }

    pub fn symbol(symbol: SymbolMatcher) -> Self {
        Self::new(symbol, ObjectMatcher::Any)
    }

    pub fn matches(&self, frame: &Frame, ctx: &MatchContext<'_>) -> bool {
        self.symbol.matches(frame, ctx) && self.object.matches(frame, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> RuntimeIdentity {
        RuntimeIdentity::new("/usr/bin/ruby", [r"^libruby\.so"]).unwrap()
    }

    #[test]
    fn test_runtime_contains_binary_and_libraries() {
        let rt = runtime();
        assert!(rt.contains(&Frame::new("main", "/usr/bin/ruby")));
        assert!(rt.contains(&Frame::new("rb_intern", "/usr/lib/libruby.so.3.3.0")));
        assert!(!rt.contains(&Frame::new("memory_leak", "/ext/ruby_memcheck_c_test.so")));
        assert!(!rt.contains(&Frame::unresolved()));
    }

    #[test]
    fn test_runtime_bare_name_matches_any_install_path() {
        let rt = RuntimeIdentity::new("ruby", Vec::<String>::new()).unwrap();
        assert!(rt.contains(&Frame::new("main", "/opt/rubies/3.3/bin/ruby")));
    }

    #[test]
    fn test_invalid_runtime_pattern_is_config_error() {
        let err = RuntimeIdentity::new("ruby", ["("]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_init_entry_matcher() {
        let module = ModuleId::new("ruby_memcheck_c_test_one");
        let rt = runtime();
        let ctx = MatchContext { module: &module, runtime: &rt };
        let init = Frame::new("Init_ruby_memcheck_c_test_one", "/ext/ruby_memcheck_c_test_one.so");
        assert!(SymbolMatcher::InitEntry.matches(&init, &ctx));
        assert!(!SymbolMatcher::InitEntry.matches(&Frame::new("Init_other", "/ext/other.so"), &ctx));
    }

    #[test]
    fn test_unresolved_symbol_never_matches_pattern() {
        let module = ModuleId::new("m");
        let rt = runtime();
        let ctx = MatchContext { module: &module, runtime: &rt };
        let matcher = SymbolMatcher::parse(".*").unwrap();
        assert!(!matcher.matches(&Frame::unresolved(), &ctx));
        assert!(SymbolMatcher::Any.matches(&Frame::unresolved(), &ctx));
    }

    #[test]
    fn test_parse_tokens() {
        assert!(matches!(ObjectMatcher::parse("@extension").unwrap(), ObjectMatcher::Extension));
        assert!(matches!(ObjectMatcher::parse("@runtime").unwrap(), ObjectMatcher::Runtime));
        assert!(matches!(SymbolMatcher::parse("@init").unwrap(), SymbolMatcher::InitEntry));
        assert!(SymbolMatcher::parse("[").is_err());
    }
}
