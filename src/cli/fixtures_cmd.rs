//! Fixture subcommands: list, verify, run.
//!
//! `verify` replays synthetic reports and needs no analyzer. `run` drives the
//! real analyzer over compiled fixture extensions, several runs at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::attribution::{OutcomeLedger, TestOutcome};
use crate::config;
use crate::error::HarnessError;
use crate::fixtures::{self_test, Expectation, Fixture, FixtureRegistry};
use crate::suppress::RuleSet;
use crate::Harness;

use super::{error_exit_code, EXIT_CONFIG, EXIT_DEFECTS, EXIT_RUN_ERROR};

/// Print every fixture with its symbol and expected classification.
pub fn run_list(json: bool) -> i32 {
    let registry = FixtureRegistry::standard();
    if json {
        let rows: Vec<_> = registry
            .fixtures()
            .map(|f| {
                serde_json::json!({
                    "fixture": f.name(),
                    "symbol": f.symbol(),
                    "expectation": f.expectation(),
                })
            })
            .collect();
        match serde_json::to_string_pretty(&rows) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_RUN_ERROR;
            }
        }
    } else {
        println!("{:<48} {:<40} EXPECT", "FIXTURE", "SYMBOL");
        for fixture in registry.fixtures() {
            println!(
                "{:<48} {:<40} {}",
                fixture.name(),
                fixture.symbol(),
                fixture.expectation()
            );
        }
    }
    0
}

/// Replay every fixture's synthetic report through the configured rules.
pub fn run_verify() -> i32 {
    let rules = match RuleSet::from_config(&config::load().rules) {
        Ok(rules) => Arc::new(rules),
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_exit_code(&e);
        }
    };
    match self_test(&FixtureRegistry::standard(), &rules) {
        Ok(report) if report.passed() => {
            println!("All {} fixtures classified as expected.", report.checked);
            0
        }
        Ok(report) => {
            for failure in &report.failures {
                eprintln!(
                    "FAIL: {} expected {}, got {}",
                    failure.fixture, failure.expected, failure.actual
                );
            }
            EXIT_DEFECTS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            error_exit_code(&e)
        }
    }
}

/// Arguments of `fixtures run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureRunArgs {
    pub ext_dir: PathBuf,
    pub runtime: Option<PathBuf>,
    pub module: Option<String>,
    pub jobs: Option<usize>,
}

/// Parse `fixtures run --ext-dir DIR [--runtime PATH] [--module NAME] [--jobs N]`.
pub fn parse_fixture_run_args(args: &[String]) -> Result<FixtureRunArgs, String> {
    let mut parsed = FixtureRunArgs::default();
    let mut ext_dir = None;
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = match flag {
            "--ext-dir" | "--runtime" | "--module" | "--jobs" => args
                .get(i + 1)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", flag))?,
            other => return Err(format!("Unknown argument: {}", other)),
        };
        match flag {
            "--ext-dir" => ext_dir = Some(PathBuf::from(value)),
            "--runtime" => parsed.runtime = Some(PathBuf::from(value)),
            "--module" => parsed.module = Some(value),
            _ => {
                let jobs = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("Invalid --jobs value: {}", value))?;
                parsed.jobs = Some(jobs);
            }
        }
        i += 2;
    }
    parsed.ext_dir = ext_dir.ok_or_else(|| "missing --ext-dir".to_string())?;
    Ok(parsed)
}

/// Run fixtures under the real analyzer and compare with expectations.
///
/// Returns 0 when every fixture met its expectation.
pub async fn run_fixtures(args: &[String]) -> i32 {
    let parsed = match parse_fixture_run_args(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: native-memcheck fixtures run --ext-dir DIR [--runtime PATH] [--module NAME] [--jobs N]");
            return EXIT_CONFIG;
        }
    };

    let env = config::load();
    let harness = match Harness::new(env.harness_config()) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_exit_code(&e);
        }
    };
    let runtime = parsed
        .runtime
        .clone()
        .unwrap_or_else(|| PathBuf::from(&env.rules.runtime_binary));

    let registry = FixtureRegistry::standard();
    let fixtures: Vec<Fixture> = registry
        .fixtures()
        .filter(|f| {
            parsed
                .module
                .as_deref()
                .map_or(true, |m| f.module_id().binary_name() == m)
        })
        .collect();
    if fixtures.is_empty() {
        eprintln!("No fixtures match the given module.");
        return EXIT_CONFIG;
    }

    let jobs = parsed.jobs.unwrap_or_else(num_cpus::get).max(1);
    tracing::info!(fixtures = fixtures.len(), jobs, "Running fixtures");
    let results = run_bounded(&harness, &fixtures, &runtime, &parsed.ext_dir, jobs).await;

    let mut ledger = OutcomeLedger::new();
    let mut mismatches = 0;
    for (fixture, result) in fixtures.iter().zip(results) {
        match result {
            Ok(outcome) => {
                let actual = Expectation::classify(&outcome);
                let met = fixture.expectation().is_met_by(&outcome);
                println!(
                    "{} {:<48} expected {:<10} got {}",
                    if met { "ok  " } else { "FAIL" },
                    fixture.name(),
                    fixture.expectation(),
                    actual
                );
                if !met {
                    mismatches += 1;
                    if let Some(message) = outcome.failure_message() {
                        println!("{}", message);
                    }
                }
                ledger.record(outcome);
            }
            Err(e) if e.is_fatal() => {
                eprintln!("Error: {}", e);
                return error_exit_code(&e);
            }
            Err(e) => {
                mismatches += 1;
                println!("FAIL {:<48} {}", fixture.name(), e);
            }
        }
    }

    for outcome in ledger.iter() {
        println!(
            "{}: {} unsuppressed, {} suppressed",
            outcome.module,
            outcome.unsuppressed_defects.len(),
            outcome.suppressed.len()
        );
    }
    if mismatches == 0 {
        0
    } else {
        EXIT_DEFECTS
    }
}

async fn run_bounded(
    harness: &Harness,
    fixtures: &[Fixture],
    runtime: &Path,
    ext_dir: &Path,
    jobs: usize,
) -> Vec<Result<TestOutcome, HarnessError>> {
    let permits = Arc::new(Semaphore::new(jobs));
    let runs = fixtures.iter().map(|fixture| {
        let permits = Arc::clone(&permits);
        let invocation = fixture.invocation(runtime, ext_dir);
        async move {
            let _permit = permits
                .acquire()
                .await
                .map_err(|_| HarnessError::IncompleteReport("run scheduler closed".into()))?;
            harness.check(fixture.module_id(), &invocation).await
        }
    });
    join_all(runs).await
}
