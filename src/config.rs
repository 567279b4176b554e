//! Harness configuration loading from environment variables.
//!
//! All configuration values are loaded from `MEMCHECK_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MEMCHECK_ANALYZER` | valgrind | Analyzer binary |
//! | `MEMCHECK_TIMEOUT` | 300 | Per-run timeout (secs) |
//! | `MEMCHECK_NUM_CALLERS` | 50 | Captured stack depth |
//! | `MEMCHECK_FRAME_PREFIX` | 12 | Frames inspected by anchored rules |
//! | `MEMCHECK_RUNTIME` | ruby | Host runtime binary |
//! | `MEMCHECK_RUNTIME_OBJECTS` | `^libruby\.so` | Runtime shared objects (comma-separated regexes) |
//! | `MEMCHECK_RUNTIME_VERSION` | unset | Selects suppression files, e.g. `ruby-3.3.0.0` |
//! | `MEMCHECK_RUNTIME_REACH` | unreachable | Reach policy of the runtime-internal rule |
//! | `MEMCHECK_SUPPRESSIONS_DIR` | suppressions | Directory of `.supp` files |
//! | `MEMCHECK_REPORT_DIR` | system temp | Parent of per-run report directories |
//! | `MEMCHECK_KEEP_REPORTS` | false | Keep report directories after a run |
//! | `MEMCHECK_GEN_SUPPRESSIONS` | false | Ask the analyzer for suppression blocks |
//! | `MEMCHECK_UNLIMITED_STACK` | true | Raise the subject's stack limit |
//! | `MEMCHECK_BUILTIN_RULES` | true | Evaluate the built-in rules |
//! | `MEMCHECK_RULES_FILE` | unset | TOML rules file |
//! | `MEMCHECK_LOG_FORMAT` | compact | `json`, `pretty` or `compact` |
//! | `MEMCHECK_LOG` | `RUST_LOG` or warn | Log filter |

use std::path::PathBuf;
use std::time::Duration;

use crate::runner::{ReportFormat, RunnerConfig, DEFAULT_ANALYZER_OPTIONS, DEFAULT_NUM_CALLERS};
use crate::suppress::{Reach, RulesConfig, DEFAULT_FRAME_PREFIX, DEFAULT_SKIPPED_RUNTIME_FUNCTIONS};
use crate::telemetry::{LogConfig, LogFormat};
use crate::HarnessConfig;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAX_NUM_CALLERS: usize = 500;

/// Effective configuration summary.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub analyzer: String,
    pub timeout_secs: u64,
    pub num_callers: usize,
    pub frame_prefix: usize,
    pub runtime: String,
    pub runtime_objects: String,
    pub runtime_version: Option<String>,
    pub runtime_reach: &'static str,
    pub suppressions_dir: String,
    pub report_dir: Option<String>,
    pub keep_reports: bool,
    pub gen_suppressions: bool,
    pub unlimited_stack: bool,
    pub builtin_rules: bool,
    pub rules_file: Option<String>,
    pub log_format: &'static str,
    pub log_level: String,
}

impl EffectiveConfig {
    /// `KEY=value` lines, in the documented variable order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            ("MEMCHECK_ANALYZER", self.analyzer.clone()),
            ("MEMCHECK_TIMEOUT", self.timeout_secs.to_string()),
            ("MEMCHECK_NUM_CALLERS", self.num_callers.to_string()),
            ("MEMCHECK_FRAME_PREFIX", self.frame_prefix.to_string()),
            ("MEMCHECK_RUNTIME", self.runtime.clone()),
            ("MEMCHECK_RUNTIME_OBJECTS", self.runtime_objects.clone()),
            ("MEMCHECK_RUNTIME_VERSION", opt(&self.runtime_version)),
            ("MEMCHECK_RUNTIME_REACH", self.runtime_reach.to_string()),
            ("MEMCHECK_SUPPRESSIONS_DIR", self.suppressions_dir.clone()),
            ("MEMCHECK_REPORT_DIR", opt(&self.report_dir)),
            ("MEMCHECK_KEEP_REPORTS", self.keep_reports.to_string()),
            ("MEMCHECK_GEN_SUPPRESSIONS", self.gen_suppressions.to_string()),
            ("MEMCHECK_UNLIMITED_STACK", self.unlimited_stack.to_string()),
            ("MEMCHECK_BUILTIN_RULES", self.builtin_rules.to_string()),
            ("MEMCHECK_RULES_FILE", opt(&self.rules_file)),
            ("MEMCHECK_LOG_FORMAT", self.log_format.to_string()),
            ("MEMCHECK_LOG", self.log_level.clone()),
        ]
    }
}

/// All harness configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub runner: RunnerConfig,
    pub rules: RulesConfig,
    pub log: LogConfig,
    pub gen_suppressions: bool,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match var(key) {
        Some(val) => val.trim().parse::<usize>().unwrap_or(default),
        None => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match var(key) {
        Some(val) => val.trim().parse::<u64>().unwrap_or(default),
        None => default,
    }
}

/// Parse a boolean env var (`1/0`, `true/false`, `yes/no`, `on/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match var(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn load_runner_config() -> RunnerConfig {
    let num_callers = parse_usize("MEMCHECK_NUM_CALLERS", DEFAULT_NUM_CALLERS).clamp(1, MAX_NUM_CALLERS);
    let timeout_secs = parse_u64("MEMCHECK_TIMEOUT", DEFAULT_TIMEOUT_SECS).max(1);
    let suppressions_dir = var("MEMCHECK_SUPPRESSIONS_DIR").unwrap_or_else(|| "suppressions".to_string());

    RunnerConfig {
        analyzer_binary: PathBuf::from(var("MEMCHECK_ANALYZER").unwrap_or_else(|| "valgrind".to_string())),
        analyzer_options: DEFAULT_ANALYZER_OPTIONS.iter().map(|s| s.to_string()).collect(),
        num_callers,
        suppression_dirs: vec![PathBuf::from(suppressions_dir)],
        runtime_version: var("MEMCHECK_RUNTIME_VERSION"),
        unlimited_stack: parse_bool("MEMCHECK_UNLIMITED_STACK", true),
        timeout: Duration::from_secs(timeout_secs),
        report_dir: var("MEMCHECK_REPORT_DIR").map(PathBuf::from),
        keep_reports: parse_bool("MEMCHECK_KEEP_REPORTS", false),
    }
}

fn load_rules_config(num_callers: usize) -> RulesConfig {
    let frame_prefix = parse_usize("MEMCHECK_FRAME_PREFIX", DEFAULT_FRAME_PREFIX).clamp(1, num_callers);
    let runtime_reach = var("MEMCHECK_RUNTIME_REACH")
        .and_then(|v| Reach::parse(v.trim()))
        .unwrap_or(Reach::Unreachable);
    let runtime_objects = match var("MEMCHECK_RUNTIME_OBJECTS") {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        None => vec![r"^libruby\.so".to_string()],
    };

    RulesConfig {
        builtin_rules: parse_bool("MEMCHECK_BUILTIN_RULES", true),
        skipped_runtime_functions: DEFAULT_SKIPPED_RUNTIME_FUNCTIONS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        runtime_reach,
        frame_prefix,
        rules_file: var("MEMCHECK_RULES_FILE").map(PathBuf::from),
        runtime_binary: var("MEMCHECK_RUNTIME").unwrap_or_else(|| "ruby".to_string()),
        runtime_objects,
    }
}

fn load_log_config() -> LogConfig {
    let format = match var("MEMCHECK_LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    };
    let level = var("MEMCHECK_LOG")
        .or_else(|| var("RUST_LOG"))
        .unwrap_or_else(|| "warn".to_string());
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let runner = load_runner_config();
    let rules = load_rules_config(runner.num_callers);
    EnvConfig {
        runner,
        rules,
        log: load_log_config(),
        gen_suppressions: parse_bool("MEMCHECK_GEN_SUPPRESSIONS", false),
    }
}

impl EnvConfig {
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            runner: self.runner.clone(),
            rules: self.rules.clone(),
        }
    }

    pub fn report_format(&self) -> ReportFormat {
        if self.gen_suppressions {
            ReportFormat::XmlWithSuppressions
        } else {
            ReportFormat::Xml
        }
    }

    /// Return a summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let path = |p: &PathBuf| p.display().to_string();
        EffectiveConfig {
            analyzer: path(&self.runner.analyzer_binary),
            timeout_secs: self.runner.timeout.as_secs(),
            num_callers: self.runner.num_callers,
            frame_prefix: self.rules.frame_prefix,
            runtime: self.rules.runtime_binary.clone(),
            runtime_objects: self.rules.runtime_objects.join(","),
            runtime_version: self.runner.runtime_version.clone(),
            runtime_reach: self.rules.runtime_reach.as_str(),
            suppressions_dir: self
                .runner
                .suppression_dirs
                .iter()
                .map(path)
                .collect::<Vec<_>>()
                .join(","),
            report_dir: self.runner.report_dir.as_ref().map(path),
            keep_reports: self.runner.keep_reports,
            gen_suppressions: self.gen_suppressions,
            unlimited_stack: self.runner.unlimited_stack,
            builtin_rules: self.rules.builtin_rules,
            rules_file: self.rules.rules_file.as_ref().map(path),
            log_format: self.log.format.as_str(),
            log_level: self.log.level.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "MEMCHECK_ANALYZER",
        "MEMCHECK_TIMEOUT",
        "MEMCHECK_NUM_CALLERS",
        "MEMCHECK_FRAME_PREFIX",
        "MEMCHECK_RUNTIME",
        "MEMCHECK_RUNTIME_OBJECTS",
        "MEMCHECK_RUNTIME_VERSION",
        "MEMCHECK_RUNTIME_REACH",
        "MEMCHECK_SUPPRESSIONS_DIR",
        "MEMCHECK_REPORT_DIR",
        "MEMCHECK_KEEP_REPORTS",
        "MEMCHECK_GEN_SUPPRESSIONS",
        "MEMCHECK_UNLIMITED_STACK",
        "MEMCHECK_BUILTIN_RULES",
        "MEMCHECK_RULES_FILE",
        "MEMCHECK_LOG_FORMAT",
        "MEMCHECK_LOG",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.runner.analyzer_binary, PathBuf::from("valgrind"));
        assert_eq!(cfg.runner.timeout.as_secs(), 300);
        assert_eq!(cfg.runner.num_callers, 50);
        assert_eq!(cfg.rules.frame_prefix, 12);
        assert_eq!(cfg.rules.runtime_binary, "ruby");
        assert_eq!(cfg.rules.runtime_reach, Reach::Unreachable);
        assert!(cfg.rules.builtin_rules);
        assert!(cfg.runner.unlimited_stack);
        assert!(!cfg.runner.keep_reports);
        assert!(!cfg.gen_suppressions);
        assert_eq!(cfg.report_format(), ReportFormat::Xml);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_ANALYZER", "/opt/valgrind/bin/valgrind");
        std::env::set_var("MEMCHECK_TIMEOUT", "30");
        std::env::set_var("MEMCHECK_RUNTIME_REACH", "callee-of-extension");
        std::env::set_var("MEMCHECK_RUNTIME_OBJECTS", r"^libruby\.so, ^libruby-3\.3\.so");
        std::env::set_var("MEMCHECK_GEN_SUPPRESSIONS", "yes");
        std::env::set_var("MEMCHECK_KEEP_REPORTS", "1");
        let cfg = load();
        assert_eq!(cfg.runner.analyzer_binary, PathBuf::from("/opt/valgrind/bin/valgrind"));
        assert_eq!(cfg.runner.timeout.as_secs(), 30);
        assert_eq!(cfg.rules.runtime_reach, Reach::CalleeOfExtension);
        assert_eq!(cfg.rules.runtime_objects.len(), 2);
        assert_eq!(cfg.report_format(), ReportFormat::XmlWithSuppressions);
        assert!(cfg.runner.keep_reports);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_TIMEOUT", "soon");
        std::env::set_var("MEMCHECK_RUNTIME_REACH", "sometimes");
        std::env::set_var("MEMCHECK_UNLIMITED_STACK", "maybe");
        let cfg = load();
        assert_eq!(cfg.runner.timeout.as_secs(), 300);
        assert_eq!(cfg.rules.runtime_reach, Reach::Unreachable);
        assert!(cfg.runner.unlimited_stack);
        clear_env_vars();
    }

    #[test]
    fn test_bounds_are_clamped() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_TIMEOUT", "0");
        std::env::set_var("MEMCHECK_NUM_CALLERS", "8");
        std::env::set_var("MEMCHECK_FRAME_PREFIX", "40");
        let cfg = load();
        assert_eq!(cfg.runner.timeout.as_secs(), 1);
        assert_eq!(cfg.runner.num_callers, 8);
        assert_eq!(cfg.rules.frame_prefix, 8, "prefix cannot exceed captured depth");

        std::env::set_var("MEMCHECK_NUM_CALLERS", "100000");
        assert_eq!(load().runner.num_callers, MAX_NUM_CALLERS);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_lists_every_variable() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        let keys: Vec<_> = eff.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ENV_KEYS);
    }
}
