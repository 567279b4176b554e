//! Analyzer command line.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{ReportFormat, RunnerConfig};

/// Options passed on every run, before the per-run ones.
pub const DEFAULT_ANALYZER_OPTIONS: &[&str] = &[
    "--error-limit=no",
    "--trace-children=yes",
    "--leak-check=full",
    "--show-leak-kinds=definite,indirect",
    "--track-origins=yes",
];

pub const DEFAULT_NUM_CALLERS: usize = 50;

/// Report file name template; the analyzer replaces `%p` with the pid so
/// forked children never write into the same file.
pub const REPORT_FILE_TEMPLATE: &str = "%p.xml";

/// Suppression file names to look for, most specific first.
///
/// `ruby-3.3.0.0` yields `ruby-3.3.0.0`, `ruby-3.3.0`, `ruby-3.3`, `ruby-3`
/// and `ruby`.
pub fn suppression_candidates(version: &str) -> Vec<String> {
    let mut names = vec![version.to_string()];
    let parts: Vec<&str> = version.split('.').collect();
    for len in (1..parts.len()).rev() {
        names.push(parts[..len].join("."));
    }
    if let Some((engine, _)) = version.split_once('-') {
        names.push(engine.to_string());
    }
    names.dedup();
    names.retain(|n| !n.is_empty());
    names
}

/// Existing `<candidate>.supp` files in `dirs`, in directory order.
pub fn discover_suppressions(dirs: &[PathBuf], version: Option<&str>) -> Vec<PathBuf> {
    let Some(version) = version else {
        return Vec::new();
    };
    let candidates = suppression_candidates(version);
    let mut found = Vec::new();
    for dir in dirs {
        for name in &candidates {
            let path = dir.join(format!("{}.supp", name));
            if path.is_file() {
                found.push(path);
            }
        }
    }
    found
}

/// Full analyzer argument list for one run writing into `report_dir`.
pub fn analyzer_args(
    config: &RunnerConfig,
    format: ReportFormat,
    report_dir: &Path,
    suppressions: &[PathBuf],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push(format!("--num-callers={}", config.num_callers).into());
    args.extend(config.analyzer_options.iter().map(OsString::from));
    args.push("--xml=yes".into());

    let mut xml_file = OsString::from("--xml-file=");
    xml_file.push(report_dir.join(REPORT_FILE_TEMPLATE));
    args.push(xml_file);

    for supp in suppressions {
        let mut arg = OsString::from("--suppressions=");
        arg.push(supp);
        args.push(arg);
    }
    if format == ReportFormat::XmlWithSuppressions {
        args.push("--gen-suppressions=all".into());
    }
    args
}
