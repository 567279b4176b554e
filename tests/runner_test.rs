//! Runner tests against a stand-in analyzer.
//!
//! The stand-in is a shell script that accepts the analyzer's command line,
//! finds `--xml-file=` and writes a canned report there, so the whole
//! pipeline runs without Valgrind installed.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use native_memcheck::fixtures::reports;
use native_memcheck::fixtures::FixtureRegistry;
use native_memcheck::runner::{ReportFormat, Runner, RunnerConfig};
use native_memcheck::subject::{Invocation, ModuleId};
use native_memcheck::{Harness, HarnessConfig, HarnessError};

const FAKE_ANALYZER: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    --xml-file=*) out="${arg#--xml-file=}" ;;
  esac
done
target() { echo "$out" | sed "s/%p/$1/"; }
echo "$@" > "$(dirname "$out")/args.txt"
case "$FAKE_MODE" in
  sleep) sleep 30 ;;
  fail) echo "valgrind: Bad option: --bogus" >&2; exit 1 ;;
  silent) exit 0 ;;
  truncated) head -c 300 "$FAKE_REPORT" > "$(target $$)" ;;
  segv) cp "$FAKE_REPORT" "$(target $$)"; kill -SEGV $$ ;;
  children) cp "$FAKE_REPORT" "$(target 300)"; cp "$FAKE_REPORT" "$(target 200)" ;;
  *) cp "$FAKE_REPORT" "$(target $$)" ;;
esac
exit "${FAKE_EXIT:-0}"
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    analyzer: PathBuf,
    report: PathBuf,
    report_parent: PathBuf,
}

fn setup(entry: &str, module: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = dir.path().join("fake-valgrind");
    std::fs::write(&analyzer, FAKE_ANALYZER).unwrap();
    std::fs::set_permissions(&analyzer, std::fs::Permissions::from_mode(0o755)).unwrap();

    let registry = FixtureRegistry::standard();
    let fixture = registry.find(module, entry).unwrap();
    let raw = reports::synthetic_report(&fixture);
    let report = dir.path().join("canned.xml");
    std::fs::write(&report, &raw.documents[0].xml).unwrap();

    let report_parent = dir.path().join("runs");
    Fixture {
        analyzer,
        report,
        report_parent,
        _dir: dir,
    }
}

fn config(fx: &Fixture) -> RunnerConfig {
    RunnerConfig {
        analyzer_binary: fx.analyzer.clone(),
        suppression_dirs: vec![],
        report_dir: Some(fx.report_parent.clone()),
        timeout: Duration::from_secs(20),
        ..Default::default()
    }
}

fn invocation(fx: &Fixture, mode: &str) -> Invocation {
    Invocation::new("ruby")
        .arg("-e")
        .arg("1")
        .env("FAKE_REPORT", &fx.report)
        .env("FAKE_MODE", mode)
}

fn run_dirs(parent: &Path) -> usize {
    std::fs::read_dir(parent).map(|d| d.count()).unwrap_or(0)
}

// =============================================================================
// Report collection
// =============================================================================

#[tokio::test]
async fn collects_single_report() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let runner = Runner::new(config(&fx));
    let raw = runner.run(&invocation(&fx, "normal"), ReportFormat::Xml).await.unwrap();
    assert_eq!(raw.documents.len(), 1);
    assert!(raw.documents[0].pid.is_some());
    assert_eq!(raw.exit_code, Some(0));
    assert_eq!(run_dirs(&fx.report_parent), 0, "run directory must be removed");
}

#[tokio::test]
async fn traced_children_produce_one_document_each() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test");
    let runner = Runner::new(config(&fx));
    let raw = runner
        .run(&invocation(&fx, "children"), ReportFormat::Xml)
        .await
        .unwrap();
    let pids: Vec<_> = raw.documents.iter().map(|d| d.pid).collect();
    assert_eq!(pids, vec![Some(200), Some(300)]);
}

#[tokio::test]
async fn keep_reports_leaves_run_directory() {
    let fx = setup("no_memory_leak", "ruby_memcheck_c_test");
    let runner = Runner::new(RunnerConfig {
        keep_reports: true,
        ..config(&fx)
    });
    runner.run(&invocation(&fx, "normal"), ReportFormat::Xml).await.unwrap();
    assert_eq!(run_dirs(&fx.report_parent), 1);
}

#[tokio::test]
async fn analyzer_receives_deterministic_options() {
    let fx = setup("no_memory_leak", "ruby_memcheck_c_test");
    let runner = Runner::new(RunnerConfig {
        keep_reports: true,
        ..config(&fx)
    });
    runner
        .run(&invocation(&fx, "normal"), ReportFormat::XmlWithSuppressions)
        .await
        .unwrap();
    let run_dir = std::fs::read_dir(&fx.report_parent)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let args = std::fs::read_to_string(run_dir.join("args.txt")).unwrap();
    for expected in [
        "--num-callers=50",
        "--error-limit=no",
        "--trace-children=yes",
        "--leak-check=full",
        "--xml=yes",
        "--gen-suppressions=all",
        "ruby -e 1",
    ] {
        assert!(args.contains(expected), "missing {} in {}", expected, args);
    }
}

// =============================================================================
// Failure modes
// =============================================================================

#[tokio::test]
async fn truncated_report_is_incomplete() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let harness = Harness::with_rules(config(&fx), Harness::new(HarnessConfig::default()).unwrap().rules().clone());
    let err = harness
        .check(&ModuleId::new("ruby_memcheck_c_test_one"), &invocation(&fx, "truncated"))
        .await
        .unwrap_err();
    assert!(err.is_incomplete(), "{:?}", err);
}

#[tokio::test]
async fn missing_report_with_clean_exit_is_incomplete() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let runner = Runner::new(config(&fx));
    let err = runner
        .run(&invocation(&fx, "silent"), ReportFormat::Xml)
        .await
        .unwrap_err();
    assert!(err.is_incomplete(), "{:?}", err);
}

#[tokio::test]
async fn analyzer_failure_keeps_stderr() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let runner = Runner::new(config(&fx));
    let err = runner
        .run(&invocation(&fx, "fail"), ReportFormat::Xml)
        .await
        .unwrap_err();
    match err {
        HarnessError::AnalyzerFailure { code, stderr } => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("Bad option"));
        }
        other => panic!("expected AnalyzerFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn crash_after_finished_report_is_incomplete() {
    let fx = setup("no_memory_leak", "ruby_memcheck_c_test");
    let runner = Runner::new(config(&fx));
    let raw = runner
        .run(&invocation(&fx, "segv"), ReportFormat::Xml)
        .await
        .unwrap();
    assert_eq!(raw.signal, Some(11));
    assert_eq!(raw.exit_code, None);

    let harness = Harness::new(HarnessConfig {
        runner: config(&fx),
        ..Default::default()
    })
    .unwrap();
    let err = harness
        .check(&ModuleId::new("ruby_memcheck_c_test"), &invocation(&fx, "segv"))
        .await
        .unwrap_err();
    assert!(err.is_incomplete(), "{:?}", err);
}

#[tokio::test]
async fn timeout_kills_the_process_group() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let runner = Runner::new(RunnerConfig {
        timeout: Duration::from_secs(1),
        ..config(&fx)
    });
    let start = Instant::now();
    let err = runner
        .run(&invocation(&fx, "sleep"), ReportFormat::Xml)
        .await
        .unwrap_err();
    assert!(err.is_incomplete(), "{:?}", err);
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
async fn cancellation_stops_the_run() {
    let fx = setup("memory_leak", "ruby_memcheck_c_test_one");
    let runner = Runner::new(config(&fx));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = runner
        .run_with(&invocation(&fx, "sleep"), ReportFormat::Xml, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_incomplete(), "{:?}", err);
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[test]
fn missing_analyzer_is_fatal() {
    let harness = Harness::new(HarnessConfig {
        runner: RunnerConfig {
            analyzer_binary: PathBuf::from("/nonexistent/valgrind"),
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    let err = tokio_test::block_on(harness.check(&ModuleId::new("ruby_memcheck_c_test"), &Invocation::new("ruby")))
        .unwrap_err();
    assert!(matches!(err, HarnessError::ToolNotFound(_)));
    assert!(err.is_fatal());
}

// =============================================================================
// Full pipeline
// =============================================================================

#[tokio::test]
async fn leak_run_fails_and_init_run_passes() {
    let leak = setup("memory_leak", "ruby_memcheck_c_test_two");
    let harness = Harness::new(HarnessConfig {
        runner: config(&leak),
        ..Default::default()
    })
    .unwrap();
    let module = ModuleId::new("ruby_memcheck_c_test_two");
    let outcome = harness.check(&module, &invocation(&leak, "normal")).await.unwrap();
    assert_eq!(outcome.unsuppressed_defects.len(), 1);
    assert_eq!(outcome.suppressed.len(), 1);
    assert_eq!(outcome.exit_code, Some(0));

    let init = setup("init", "ruby_memcheck_c_test_two");
    let harness = Harness::new(HarnessConfig {
        runner: config(&init),
        ..Default::default()
    })
    .unwrap();
    let outcome = harness.check(&module, &invocation(&init, "normal")).await.unwrap();
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn concurrent_runs_do_not_share_reports() {
    let leak = setup("memory_leak", "ruby_memcheck_c_test_one");
    let clean = setup("no_memory_leak", "ruby_memcheck_c_test");
    let rules = Harness::new(HarnessConfig::default()).unwrap().rules().clone();
    let leak_harness = Harness::with_rules(config(&leak), rules.clone());
    let clean_harness = Harness::with_rules(config(&clean), rules);

    let one = ModuleId::new("ruby_memcheck_c_test_one");
    let plain = ModuleId::new("ruby_memcheck_c_test");
    let leak_inv = invocation(&leak, "normal");
    let clean_inv = invocation(&clean, "normal");
    let (a, b) = tokio::join!(
        leak_harness.check(&one, &leak_inv),
        clean_harness.check(&plain, &clean_inv),
    );
    assert!(!a.unwrap().is_clean());
    assert!(b.unwrap().is_clean());
}
