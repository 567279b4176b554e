//! native-memcheck
//!
//! A memory-defect harness for native extension modules loaded into a
//! dynamic-language host runtime. The harness runs the subject under
//! Valgrind Memcheck, parses its XML reports, attributes every defect to the
//! extension under test and suppresses the structurally benign ones. Every
//! surviving defect is a hard test failure.
//!
//! # Pipeline
//!
//! ```text
//! Runner ──RawReport──▶ parse_report ──Vec<Defect>──▶ SuppressionEngine
//!                                                        │ (Defect, Verdict)
//!                                                        ▼
//!                           TestOutcome ◀────────────── Attributor
//! ```
//!
//! Parsing, suppression and attribution are pure. Only the runner touches
//! processes and the filesystem.

pub mod attribution;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod report;
pub mod runner;
pub mod subject;
pub mod suppress;
pub mod telemetry;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use attribution::{Attributor, TestOutcome};
use error::Result;
use report::{parse_report, RawReport};
use runner::{ReportFormat, Runner, RunnerConfig};
use subject::{Invocation, ModuleId};
use suppress::{RuleSet, RulesConfig, SuppressionEngine};
use telemetry::{RunSpan, SpanExt};

pub use error::HarnessError;

/// Harness configuration.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub runner: RunnerConfig,
    pub rules: RulesConfig,
}

/// The test-framework entry point.
///
/// Rules are loaded once; clones share the same [`RuleSet`] and may run
/// concurrently.
#[derive(Debug, Clone)]
pub struct Harness {
    runner: Runner,
    rules: Arc<RuleSet>,
    attributor: Attributor,
}

impl Harness {
    /// Build a harness, loading the rule set. Fails with
    /// [`HarnessError::Config`] on an invalid rules file or pattern.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let rules = RuleSet::from_config(&config.rules)?;
        Ok(Self::with_rules(config.runner, Arc::new(rules)))
    }

    /// Build a harness from `MEMCHECK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(config::load().harness_config())
    }

    pub fn with_rules(runner: RunnerConfig, rules: Arc<RuleSet>) -> Self {
        Self {
            runner: Runner::new(runner),
            rules,
            attributor: Attributor::new(),
        }
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn engine(&self, module: &ModuleId) -> SuppressionEngine {
        SuppressionEngine::new(Arc::clone(&self.rules), module.clone())
    }

    /// Run `invocation` under the analyzer and judge its report.
    pub async fn check(&self, module: &ModuleId, invocation: &Invocation) -> Result<TestOutcome> {
        self.check_with(module, invocation, ReportFormat::Xml, &CancellationToken::new())
            .await
    }

    pub async fn check_with(
        &self,
        module: &ModuleId,
        invocation: &Invocation,
        format: ReportFormat,
        cancel: &CancellationToken,
    ) -> Result<TestOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id, module);
        let start = Instant::now();

        let result = async {
            tracing::debug!(program = %invocation.program.display(), "Starting analyzed run");
            let raw = self.runner.run_with(invocation, format, cancel).await?;
            self.judge(module, &raw)
        }
        .instrument(span.clone())
        .await;

        match &result {
            Ok(outcome) => span.record_outcome(outcome, start.elapsed()),
            Err(_) => span.record_result(&result),
        }
        result
    }

    /// Judge reports captured earlier, without running anything.
    pub fn check_reports(&self, module: &ModuleId, raw: &RawReport) -> Result<TestOutcome> {
        let span = RunSpan::new(&uuid::Uuid::new_v4().to_string(), module);
        let start = Instant::now();
        let _enter = span.enter();

        let result = self.judge(module, raw);
        match &result {
            Ok(outcome) => span.record_outcome(outcome, start.elapsed()),
            Err(_) => span.record_result(&result),
        }
        result
    }

    fn judge(&self, module: &ModuleId, raw: &RawReport) -> Result<TestOutcome> {
        // A crashed subject still gets a FINISHED status; it must not pass.
        if let Some(signal) = raw.signal {
            return Err(HarnessError::IncompleteReport(format!(
                "subject killed by signal {}",
                signal
            )));
        }
        let defects = parse_report(raw)?;
        let evaluated = self.engine(module).evaluate_all(defects);
        Ok(self.attributor.attribute(module, raw.exit_code, evaluated))
    }
}
