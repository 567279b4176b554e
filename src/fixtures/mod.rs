//! Known-answer fixture registry.
//!
//! Three deliberately defective extension modules back the harness's own
//! test suite. Each exposes the same entry points (under different symbol
//! prefixes) plus its init routine, and every entry point has an expected
//! classification. [`self_test`] replays a synthetic report for every
//! fixture through the full pipeline and compares the result with the
//! expectation, so a policy regression fails loudly before any real run.

pub mod reports;

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::attribution::{Attributor, TestOutcome};
use crate::error::Result;
use crate::report::parse_report;
use crate::subject::{Invocation, ModuleId};
use crate::suppress::{RuleSet, SuppressionEngine};

/// Expected classification of one fixture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Nothing survives suppression.
    Clean,
    /// Only leak kinds survive.
    Leak,
    /// At least one invalid access or uninitialised-value use survives.
    Error,
    /// Nothing survives, and at least one defect was suppressed.
    Suppressed,
}

impl Expectation {
    /// Best description of `outcome`.
    pub fn classify(outcome: &TestOutcome) -> Self {
        if outcome.is_clean() {
            if outcome.suppressed.is_empty() {
                Self::Clean
            } else {
                Self::Suppressed
            }
        } else if outcome.unsuppressed_defects.iter().all(|d| d.kind.is_leak()) {
            Self::Leak
        } else {
            Self::Error
        }
    }

    /// Returns true if `outcome` satisfies this expectation.
    pub fn is_met_by(&self, outcome: &TestOutcome) -> bool {
        match self {
            Self::Clean => outcome.is_clean(),
            Self::Suppressed => outcome.is_clean() && !outcome.suppressed.is_empty(),
            Self::Leak | Self::Error => Self::classify(outcome) == *self,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Leak => "leak",
            Self::Error => "error",
            Self::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry points every fixture module exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Loading the module without calling anything.
    ModuleInit,
    NoMemoryLeak,
    MemoryLeak,
    UseAfterFree,
    UninitializedValue,
    CallIntoRubyMemLeak,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 6] = [
        Self::ModuleInit,
        Self::NoMemoryLeak,
        Self::MemoryLeak,
        Self::UseAfterFree,
        Self::UninitializedValue,
        Self::CallIntoRubyMemLeak,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ModuleInit => "init",
            Self::NoMemoryLeak => "no_memory_leak",
            Self::MemoryLeak => "memory_leak",
            Self::UseAfterFree => "use_after_free",
            Self::UninitializedValue => "uninitialized_value",
            Self::CallIntoRubyMemLeak => "call_into_ruby_mem_leak",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

/// Source lines the synthetic reports point at.
#[derive(Debug, Clone, Copy)]
pub struct SourceLines {
    pub helper_malloc: u32,
    pub memory_leak: u32,
    pub use_after_free: u32,
    pub uninitialized_value: u32,
    pub call_into_ruby_mem_leak: u32,
    pub init_leak: u32,
}

/// How `call_into_ruby_mem_leak` makes the runtime allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCallback {
    /// Interns ten thousand fresh symbols.
    Intern,
    /// Evaluates a string allocation and drops the buffer pointer.
    EvalString,
}

/// One fixture extension module.
#[derive(Debug, Clone)]
pub struct FixtureModule {
    id: ModuleId,
    class_name: &'static str,
    symbol_prefix: &'static str,
    leak_helper: bool,
    init_leaks: bool,
    callback: RuntimeCallback,
    lines: SourceLines,
}

impl FixtureModule {
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Ruby class the module defines under `RubyMemcheck`.
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn symbol_prefix(&self) -> &'static str {
        self.symbol_prefix
    }

    /// Native symbol implementing `entry`.
    pub fn symbol(&self, entry: EntryPoint) -> String {
        match entry {
            EntryPoint::ModuleInit => self.id.init_symbol().to_string(),
            other => format!("{}{}", self.symbol_prefix, other.name()),
        }
    }

    /// The non-inlined allocation helper, if the module has one.
    pub fn leak_helper(&self) -> Option<String> {
        self.leak_helper
            .then(|| format!("{}allocate_memory_leak", self.symbol_prefix))
    }

    /// Returns true if the init routine leaks 100 bytes.
    pub fn init_leaks(&self) -> bool {
        self.init_leaks
    }

    pub fn source_file(&self) -> String {
        format!("{}.c", self.id.binary_name())
    }

    pub fn object_path(&self) -> String {
        format!("/fixtures/ext/{}.so", self.id.binary_name())
    }

    pub fn lines(&self) -> SourceLines {
        self.lines
    }

    pub fn callback(&self) -> RuntimeCallback {
        self.callback
    }

    fn expectation(&self, entry: EntryPoint) -> Expectation {
        match entry {
            EntryPoint::ModuleInit if self.init_leaks => Expectation::Suppressed,
            EntryPoint::ModuleInit | EntryPoint::NoMemoryLeak => Expectation::Clean,
            EntryPoint::MemoryLeak | EntryPoint::CallIntoRubyMemLeak => Expectation::Leak,
            EntryPoint::UseAfterFree | EntryPoint::UninitializedValue => Expectation::Error,
        }
    }
}

/// A (module, entry point) pair with its expected classification.
#[derive(Debug, Clone)]
pub struct Fixture {
    module: FixtureModule,
    entry: EntryPoint,
    expectation: Expectation,
}

impl Fixture {
    pub fn module(&self) -> &FixtureModule {
        &self.module
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module.id
    }

    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub fn expectation(&self) -> Expectation {
        self.expectation
    }

    pub fn symbol(&self) -> String {
        self.module.symbol(self.entry)
    }

    /// `module/entry`, e.g. `ruby_memcheck_c_test_one/memory_leak`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.module.id, self.entry.name())
    }

    /// Ruby snippet loading the module and calling the entry point once.
    pub fn script(&self) -> String {
        let require = format!("require '{}'", self.module.id.binary_name());
        match self.entry {
            EntryPoint::ModuleInit => require,
            entry => format!(
                "{}; RubyMemcheck::{}.new.{}",
                require,
                self.module.class_name,
                entry.name()
            ),
        }
    }

    /// Invocation running the fixture with `runtime`, loading compiled
    /// extensions from `ext_dir`.
    pub fn invocation(&self, runtime: impl AsRef<Path>, ext_dir: impl AsRef<Path>) -> Invocation {
        let mut include = OsString::from("-I");
        include.push(ext_dir.as_ref());
        Invocation::new(runtime).arg(include).arg("-e").arg(self.script())
    }
}

/// Lookup of fixture modules by [`ModuleId`].
#[derive(Debug, Clone)]
pub struct FixtureRegistry {
    modules: Vec<FixtureModule>,
}

impl FixtureRegistry {
    /// The three fixture modules.
    pub fn standard() -> Self {
        let one_lines = SourceLines {
            helper_malloc: 13,
            memory_leak: 19,
            use_after_free: 27,
            uninitialized_value: 35,
            call_into_ruby_mem_leak: 44,
            init_leak: 52,
        };
        Self {
            modules: vec![
                FixtureModule {
                    id: ModuleId::new("ruby_memcheck_c_test"),
                    class_name: "CTest",
                    symbol_prefix: "",
                    leak_helper: false,
                    init_leaks: false,
                    callback: RuntimeCallback::Intern,
                    lines: SourceLines {
                        helper_malloc: 12,
                        memory_leak: 12,
                        use_after_free: 21,
                        uninitialized_value: 29,
                        call_into_ruby_mem_leak: 38,
                        init_leak: 45,
                    },
                },
                FixtureModule {
                    id: ModuleId::new("ruby_memcheck_c_test_one"),
                    class_name: "CTestOne",
                    symbol_prefix: "c_test_one_",
                    leak_helper: true,
                    init_leaks: true,
                    callback: RuntimeCallback::Intern,
                    lines: one_lines,
                },
                FixtureModule {
                    id: ModuleId::new("ruby_memcheck_c_test_two"),
                    class_name: "CTestTwo",
                    symbol_prefix: "c_test_two_",
                    leak_helper: true,
                    init_leaks: true,
                    callback: RuntimeCallback::EvalString,
                    lines: SourceLines {
                        call_into_ruby_mem_leak: 41,
                        init_leak: 50,
                        ..one_lines
                    },
                },
            ],
        }
    }

    pub fn modules(&self) -> &[FixtureModule] {
        &self.modules
    }

    pub fn module(&self, id: &ModuleId) -> Option<&FixtureModule> {
        self.modules.iter().find(|m| &m.id == id)
    }

    pub fn lookup(&self, id: &ModuleId, entry: EntryPoint) -> Option<Fixture> {
        self.module(id).map(|module| Fixture {
            module: module.clone(),
            entry,
            expectation: module.expectation(entry),
        })
    }

    /// Lookup by binary name and entry point name.
    pub fn find(&self, module: &str, entry: &str) -> Option<Fixture> {
        let entry = EntryPoint::from_name(entry)?;
        let id = self.modules.iter().find(|m| m.id.binary_name() == module)?.id.clone();
        self.lookup(&id, entry)
    }

    /// Every fixture, module by module.
    pub fn fixtures(&self) -> impl Iterator<Item = Fixture> + '_ {
        self.modules.iter().flat_map(|module| {
            EntryPoint::ALL.into_iter().map(move |entry| Fixture {
                module: module.clone(),
                entry,
                expectation: module.expectation(entry),
            })
        })
    }
}

/// One fixture whose synthetic report was misclassified.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestFailure {
    pub fixture: String,
    pub expected: Expectation,
    pub actual: Expectation,
}

/// Result of [`self_test`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelfTestReport {
    pub checked: usize,
    pub failures: Vec<SelfTestFailure>,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Judge the synthetic report of `fixture` with `rules`.
pub fn judge_synthetic(fixture: &Fixture, rules: &Arc<RuleSet>) -> Result<TestOutcome> {
    let raw = reports::synthetic_report(fixture);
    let defects = parse_report(&raw)?;
    let engine = SuppressionEngine::new(Arc::clone(rules), fixture.module_id().clone());
    Ok(Attributor::new().attribute(fixture.module_id(), raw.exit_code, engine.evaluate_all(defects)))
}

/// Replay every fixture's synthetic report through parse, suppress and
/// attribute, and compare with the expectation.
pub fn self_test(registry: &FixtureRegistry, rules: &Arc<RuleSet>) -> Result<SelfTestReport> {
    let mut report = SelfTestReport::default();
    for fixture in registry.fixtures() {
        let outcome = judge_synthetic(&fixture, rules)?;
        report.checked += 1;
        if !fixture.expectation().is_met_by(&outcome) {
            let actual = Expectation::classify(&outcome);
            tracing::error!(
                fixture = %fixture.name(),
                expected = %fixture.expectation(),
                actual = %actual,
                "Fixture self-test failed"
            );
            report.failures.push(SelfTestFailure {
                fixture: fixture.name(),
                expected: fixture.expectation(),
                actual,
            });
        }
    }
    Ok(report)
}
