//! native-memcheck entry point.
//!
//! ## CLI Subcommands
//!
//! - `native-memcheck run` - Run a subject under Memcheck and judge it
//! - `native-memcheck parse` - Judge previously captured XML reports
//! - `native-memcheck fixtures` - List, verify or run the fixture extensions
//! - `native-memcheck config` - Show or validate configuration

use std::process::ExitCode;

use native_memcheck::cli::{config_cmd, fixtures_cmd, run_cmd};
use native_memcheck::config as memcheck_config;
use native_memcheck::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    let log = memcheck_config::load().log;
    if let Err(e) = telemetry::init_logging(&log) {
        eprintln!("WARNING: logging disabled: {}", e);
    }

    let code = match command {
        "run" => run_cmd::run_run(rest).await,
        "parse" => run_cmd::run_parse(rest).await,
        "fixtures" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("list");
            let sub_args = rest.get(1..).unwrap_or(&[]);
            match subcommand {
                "list" => fixtures_cmd::run_list(sub_args.iter().any(|a| a == "--json")),
                "verify" => fixtures_cmd::run_verify(),
                "run" => fixtures_cmd::run_fixtures(sub_args).await,
                _ => {
                    eprintln!("Unknown fixtures subcommand: {}", subcommand);
                    print_command_help("fixtures");
                    2
                }
            }
        }
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    0
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    0
                }
                "validate" => config_cmd::run_validate(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    2
                }
            }
        }
        "help" | "--help" | "-h" => {
            match rest.first() {
                Some(subcommand) => print_command_help(subcommand),
                None => print_usage(),
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("native-memcheck {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            2
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "native-memcheck - Memory-defect harness for native extensions v{}

USAGE:
    native-memcheck <COMMAND> [OPTIONS]

COMMANDS:
    run          Run a subject under Memcheck and report unsuppressed defects
    parse        Judge previously captured Memcheck XML reports
    fixtures     List, verify or run the fixture extensions
    config       Show, validate or print default configuration
    version      Show version information
    help         Show this help message

EXAMPLES:
    native-memcheck run --module ruby_memcheck_c_test_one -- ruby -Itmp -e 'require \"ruby_memcheck_c_test_one\"'
    native-memcheck parse --module ruby_memcheck_c_test_one reports/*.xml
    native-memcheck fixtures verify
    native-memcheck config validate

ENVIRONMENT:
    MEMCHECK_ANALYZER      Analyzer binary (default: valgrind)
    MEMCHECK_TIMEOUT       Per-run timeout in seconds (default: 300)
    MEMCHECK_RULES_FILE    TOML suppression rules file
    MEMCHECK_LOG           Log filter (default: RUST_LOG or warn)
    See 'native-memcheck config defaults' for the full list.

EXIT CODES:
    0  Clean
    1  Unsuppressed defects found
    2  Configuration error
    3  Run error (analyzer missing, incomplete or malformed report)
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "native-memcheck run - Run a subject under Memcheck

USAGE:
    native-memcheck run --module NAME [OPTIONS] -- PROGRAM [ARGS...]

OPTIONS:
    --module NAME         Binary name of the extension under test
    --init-symbol SYM     Init entry point (default: Init_<NAME>)
    --json                Print the outcome as JSON
    --gen-suppressions    Include analyzer-generated suppressions

EXIT CODES:
    0  Clean
    1  Unsuppressed defects found
    2  Configuration error
    3  Run error
"
            );
        }
        "parse" => {
            eprintln!(
                "native-memcheck parse - Judge captured reports

USAGE:
    native-memcheck parse --module NAME [OPTIONS] FILE...

OPTIONS:
    --module NAME         Binary name of the extension under test
    --init-symbol SYM     Init entry point (default: Init_<NAME>)
    --json                Print the outcome as JSON

DESCRIPTION:
    Files are treated as the documents of one run. A numeric file stem
    (4242.xml) is taken as the process id.
"
            );
        }
        "fixtures" => {
            eprintln!(
                "native-memcheck fixtures - Fixture extensions

USAGE:
    native-memcheck fixtures <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    list [--json]    List fixtures with their expected classification
    verify           Replay synthetic reports through the active rules
    run              Run fixtures under the analyzer

RUN OPTIONS:
    --ext-dir DIR    Directory holding the compiled fixture extensions
    --runtime PATH   Host runtime binary (default: MEMCHECK_RUNTIME)
    --module NAME    Only run this fixture module
    --jobs N         Concurrent runs (default: CPU count)
"
            );
        }
        "config" => {
            eprintln!(
                "native-memcheck config - Manage configuration

USAGE:
    native-memcheck config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show current configuration
    validate       Validate configuration and rules file
    defaults       Show default configuration
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'native-memcheck help' for general usage.",
                command
            );
        }
    }
}
