//! `run` and `parse` subcommands.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config;
use crate::report::{RawReport, ReportDocument};
use crate::runner::ReportFormat;
use crate::subject::{Invocation, ModuleId};
use crate::Harness;

use super::{error_exit_code, print_outcome, EXIT_CONFIG, EXIT_RUN_ERROR};

/// Arguments of `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub module: ModuleId,
    pub json: bool,
    pub gen_suppressions: bool,
    pub command: Vec<String>,
}

/// Arguments of `parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseArgs {
    pub module: ModuleId,
    pub json: bool,
    pub files: Vec<PathBuf>,
}

fn module_id(name: Option<String>, init: Option<String>) -> Result<ModuleId, String> {
    let name = name.ok_or_else(|| "missing --module".to_string())?;
    let id = ModuleId::new(name);
    Ok(match init {
        Some(symbol) => id.with_init_symbol(symbol),
        None => id,
    })
}

/// Parse `run --module NAME [--init-symbol SYM] [--json] [--gen-suppressions] -- PROGRAM ARGS...`.
///
/// `args` starts after the subcommand name.
pub fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let mut module = None;
    let mut init = None;
    let mut json = false;
    let mut gen_suppressions = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--module" | "--init-symbol" => {
                let value = args
                    .get(i + 1)
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}", args[i]))?;
                if args[i] == "--module" {
                    module = Some(value);
                } else {
                    init = Some(value);
                }
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            "--gen-suppressions" => {
                gen_suppressions = true;
                i += 1;
            }
            "--" => {
                i += 1;
                break;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    let command = args[i.min(args.len())..].to_vec();
    if command.is_empty() {
        return Err("missing subject command after --".to_string());
    }
    Ok(RunArgs {
        module: module_id(module, init)?,
        json,
        gen_suppressions,
        command,
    })
}

/// Parse `parse --module NAME [--init-symbol SYM] [--json] FILE...`.
pub fn parse_parse_args(args: &[String]) -> Result<ParseArgs, String> {
    let mut module = None;
    let mut init = None;
    let mut json = false;
    let mut files = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--module" | "--init-symbol" => {
                let value = args
                    .get(i + 1)
                    .cloned()
                    .ok_or_else(|| format!("Missing value for {}", args[i]))?;
                if args[i] == "--module" {
                    module = Some(value);
                } else {
                    init = Some(value);
                }
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            flag if flag.starts_with("--") => return Err(format!("Unknown argument: {}", flag)),
            file => {
                files.push(PathBuf::from(file));
                i += 1;
            }
        }
    }

    if files.is_empty() {
        return Err("no report files given".to_string());
    }
    Ok(ParseArgs {
        module: module_id(module, init)?,
        json,
        files,
    })
}

/// Run a subject under the analyzer and print its outcome.
pub async fn run_run(args: &[String]) -> i32 {
    let parsed = match parse_run_args(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: native-memcheck run --module NAME [--json] [--gen-suppressions] -- PROGRAM ARGS...");
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

    let format = if parsed.gen_suppressions {
        ReportFormat::XmlWithSuppressions
    } else {
        env.report_format()
    };
    let (program, rest) = match parsed.command.split_first() {
        Some(split) => split,
        None => return EXIT_CONFIG,
    };
    let invocation = Invocation::new(program).args(rest.iter());

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = harness
        .check_with(&parsed.module, &invocation, format, &cancel)
        .await;
    ctrl_c.abort();

    match result {
        Ok(outcome) => print_outcome(&outcome, parsed.json),
        Err(e) => {
            eprintln!("Error: {}", e);
            error_exit_code(&e)
        }
    }
}

/// Judge report files captured earlier.
pub async fn run_parse(args: &[String]) -> i32 {
    let parsed = match parse_parse_args(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: native-memcheck parse --module NAME [--json] FILE...");
            return EXIT_CONFIG;
        }
    };

    let harness = match Harness::new(config::load().harness_config()) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_exit_code(&e);
        }
    };

    let mut documents = Vec::with_capacity(parsed.files.len());
    for path in &parsed.files {
        let xml = match tokio::fs::read_to_string(path).await {
            Ok(xml) => xml,
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", path.display(), e);
                return EXIT_RUN_ERROR;
            }
        };
        let pid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok());
        documents.push(ReportDocument::new(pid, xml));
    }

    match harness.check_reports(&parsed.module, &RawReport::from_documents(documents)) {
        Ok(outcome) => print_outcome(&outcome, parsed.json),
        Err(e) => {
            eprintln!("Error: {}", e);
            error_exit_code(&e)
        }
    }
}
