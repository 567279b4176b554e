//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables.

use std::path::Path;

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::error::HarnessError;
use crate::suppress::RuleSet;

use super::EXIT_CONFIG;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("MEMCHECK_ANALYZER=valgrind");
    println!("MEMCHECK_TIMEOUT=300");
    println!("MEMCHECK_NUM_CALLERS=50");
    println!("MEMCHECK_FRAME_PREFIX=12");
    println!("MEMCHECK_RUNTIME=ruby");
    println!(r"MEMCHECK_RUNTIME_OBJECTS=^libruby\.so");
    println!("MEMCHECK_RUNTIME_VERSION=");
    println!("MEMCHECK_RUNTIME_REACH=unreachable");
    println!("MEMCHECK_SUPPRESSIONS_DIR=suppressions");
    println!("MEMCHECK_REPORT_DIR=");
    println!("MEMCHECK_KEEP_REPORTS=false");
    println!("MEMCHECK_GEN_SUPPRESSIONS=false");
    println!("MEMCHECK_UNLIMITED_STACK=true");
    println!("MEMCHECK_BUILTIN_RULES=true");
    println!("MEMCHECK_RULES_FILE=");
    println!("MEMCHECK_LOG_FORMAT=compact");
    println!("MEMCHECK_LOG=warn");
}

/// Validate configuration.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the rule set cannot
/// be built.
pub fn run_validate() -> i32 {
    let env = config::load();
    match validate(&env) {
        Ok(warnings) if warnings.is_empty() => {
            println!("Configuration is valid.");
            0
        }
        Ok(warnings) => {
            for warning in &warnings {
                eprintln!("WARNING: {}", warning);
            }
            1
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            EXIT_CONFIG
        }
    }
}

/// Build the rule set and collect warnings about the environment.
pub fn validate(env: &EnvConfig) -> Result<Vec<String>, HarnessError> {
    let rules = RuleSet::from_config(&env.rules)?;
    let mut warnings = Vec::new();

    let analyzer = &env.runner.analyzer_binary;
    if !executable_exists(analyzer) {
        warnings.push(format!(
            "MEMCHECK_ANALYZER ({}) was not found; every run will fail",
            analyzer.display()
        ));
    }

    for dir in &env.runner.suppression_dirs {
        if env.runner.runtime_version.is_some() && !dir.is_dir() {
            warnings.push(format!(
                "MEMCHECK_SUPPRESSIONS_DIR ({}) is not a directory; no suppression files will be passed",
                dir.display()
            ));
        }
    }

    if rules.is_empty() {
        warnings.push("no suppression rules are active; module initialization leaks will fail runs".to_string());
    }

    Ok(warnings)
}

fn executable_exists(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.entries() {
        println!("{}={}", key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_passes_with_existing_analyzer() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_ANALYZER", "/bin/sh");
        let warnings = validate(&config::load()).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        assert_eq!(run_validate(), 0);
        clear_env_vars();
    }

    #[test]
    fn test_validate_warns_on_missing_analyzer() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_ANALYZER", "/nonexistent/valgrind");
        let warnings = validate(&config::load()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("MEMCHECK_ANALYZER"));
        assert_eq!(run_validate(), 1);
        clear_env_vars();
    }

    #[test]
    fn test_validate_warns_when_no_rules_are_active() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MEMCHECK_ANALYZER", "/bin/sh");
        std::env::set_var("MEMCHECK_BUILTIN_RULES", "false");
        let warnings = validate(&config::load()).unwrap();
        assert!(warnings.iter().any(|w| w.contains("no suppression rules")));
        clear_env_vars();
    }

    #[test]
    fn test_validate_rejects_bad_rules_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            "[[rule]]\nname = \"x\"\nreason = \"y\"\nkinds = [\"invalid_write\"]\nframes = [{ symbol = \"*\" }]\n",
        )
        .unwrap();
        std::env::set_var("MEMCHECK_RULES_FILE", &path);
        let err = validate(&config::load()).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
        assert_eq!(run_validate(), EXIT_CONFIG);
        clear_env_vars();
    }
}
