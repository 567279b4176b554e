//! CLI subcommands for the memcheck harness.
//!
//! ## Usage
//!
//! ```bash
//! native-memcheck run --module ruby_memcheck_c_test_one -- ruby -e '...'
//! native-memcheck parse --module ruby_memcheck_c_test_one 4242.xml
//! native-memcheck fixtures verify
//! native-memcheck config validate
//! ```

pub mod config_cmd;
pub mod fixtures_cmd;
pub mod run_cmd;

use crate::attribution::TestOutcome;
use crate::error::HarnessError;

/// Run finished and nothing survived suppression.
pub const EXIT_CLEAN: i32 = 0;
/// At least one unsuppressed defect.
pub const EXIT_DEFECTS: i32 = 1;
/// Invalid configuration, rules file or arguments.
pub const EXIT_CONFIG: i32 = 2;
/// The run itself failed (missing analyzer, incomplete or malformed report).
pub const EXIT_RUN_ERROR: i32 = 3;

/// Map a harness error to a process exit code.
pub fn error_exit_code(err: &HarnessError) -> i32 {
    match err {
        HarnessError::Config(_) => EXIT_CONFIG,
        _ => EXIT_RUN_ERROR,
    }
}

/// Print `outcome` to stdout and return the matching exit code.
pub fn print_outcome(outcome: &TestOutcome, json: bool) -> i32 {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize outcome: {}", e);
                return EXIT_RUN_ERROR;
            }
        }
    } else {
        match outcome.failure_message() {
            Some(message) => println!("{}", message),
            None => println!(
                "{}: clean ({} suppressed)",
                outcome.module,
                outcome.suppressed.len()
            ),
        }
    }
    if outcome.is_clean() {
        EXIT_CLEAN
    } else {
        EXIT_DEFECTS
    }
}
