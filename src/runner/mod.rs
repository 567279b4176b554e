//! Runner: drives the analyzer over one subject invocation.
//!
//! Each run gets a private report directory, so concurrent runs never read
//! each other's documents. The directory is removed when the run ends unless
//! `keep_reports` is set.

mod command;
mod process;

pub use command::{
    analyzer_args, discover_suppressions, suppression_candidates, DEFAULT_ANALYZER_OPTIONS,
    DEFAULT_NUM_CALLERS, REPORT_FILE_TEMPLATE,
};

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{excerpt, HarnessError, Result};
use crate::report::{RawReport, ReportDocument};
use crate::subject::Invocation;

/// Whether the analyzer should also emit a suppression block per error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Xml,
    XmlWithSuppressions,
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub analyzer_binary: PathBuf,
    pub analyzer_options: Vec<String>,
    pub num_callers: usize,
    /// Directories searched for version-specific `.supp` files.
    pub suppression_dirs: Vec<PathBuf>,
    /// Runtime version used to pick suppression files (`ruby-3.3.0.0`).
    pub runtime_version: Option<String>,
    /// Raise the subject's stack soft limit to its hard limit.
    pub unlimited_stack: bool,
    pub timeout: Duration,
    /// Parent of per-run report directories; the system temp dir if unset.
    pub report_dir: Option<PathBuf>,
    pub keep_reports: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            analyzer_binary: PathBuf::from("valgrind"),
            analyzer_options: DEFAULT_ANALYZER_OPTIONS.iter().map(|s| s.to_string()).collect(),
            num_callers: DEFAULT_NUM_CALLERS,
            suppression_dirs: vec![PathBuf::from("suppressions")],
            runtime_version: None,
            unlimited_stack: true,
            timeout: Duration::from_secs(300),
            report_dir: None,
            keep_reports: false,
        }
    }
}

/// Launches the subject under the analyzer and collects its reports.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    suppressions: Vec<PathBuf>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let suppressions = discover_suppressions(&config.suppression_dirs, config.runtime_version.as_deref());
        if !suppressions.is_empty() {
            tracing::debug!(files = ?suppressions, "Using suppression files");
        }
        Self { config, suppressions }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn suppression_files(&self) -> &[PathBuf] {
        &self.suppressions
    }

    pub async fn run(&self, invocation: &Invocation, format: ReportFormat) -> Result<RawReport> {
        self.run_with(invocation, format, &CancellationToken::new()).await
    }

    /// Run `invocation` under the analyzer; cancelling `cancel` kills the
    /// process group and yields [`HarnessError::IncompleteReport`].
    pub async fn run_with(
        &self,
        invocation: &Invocation,
        format: ReportFormat,
        cancel: &CancellationToken,
    ) -> Result<RawReport> {
        let dir = self.create_run_dir()?;
        let args = analyzer_args(&self.config, format, dir.path(), &self.suppressions);

        let mut command = Command::new(&self.config.analyzer_binary);
        command.args(&args).arg(&invocation.program).args(&invocation.args);
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        if let Some(cwd) = &invocation.current_dir {
            command.current_dir(cwd);
        }

        let result = match process::supervise(command, self.config.timeout, self.config.unlimited_stack, cancel).await {
            Ok(output) => collect_report(dir.path(), output).await,
            Err(e) => Err(e),
        };
        self.finish_run_dir(dir);
        result
    }

    fn create_run_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("memcheck-");
        let dir = match &self.config.report_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn finish_run_dir(&self, dir: tempfile::TempDir) {
        if self.config.keep_reports {
            let kept = dir.into_path();
            tracing::info!(dir = %kept.display(), "Keeping analyzer reports");
        }
    }
}

/// Read every report document the run left in `dir`.
async fn collect_report(dir: &Path, output: Output) -> Result<RawReport> {
    let mut documents = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let pid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok());
        let xml = tokio::fs::read_to_string(&path).await?;
        documents.push(ReportDocument::new(pid, xml));
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code();
    let signal = exit_signal(&output.status);

    if documents.is_empty() {
        return Err(match (signal, exit_code) {
            (Some(sig), _) => {
                HarnessError::IncompleteReport(format!("analyzer killed by signal {} before writing a report", sig))
            }
            (None, Some(0)) => HarnessError::IncompleteReport("analyzer exited without writing a report".into()),
            (None, code) => HarnessError::AnalyzerFailure {
                code,
                stderr: excerpt(&stderr),
            },
        });
    }

    tracing::debug!(documents = documents.len(), exit_code = ?exit_code, "Collected analyzer reports");
    let mut report = RawReport::from_documents(documents)
        .with_exit_code(exit_code)
        .with_signal(signal);
    report.stderr = stderr;
    Ok(report)
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.analyzer_binary, PathBuf::from("valgrind"));
        assert_eq!(config.num_callers, 50);
        assert!(config.unlimited_stack);
        assert!(!config.keep_reports);
    }

    #[test]
    fn test_run_dirs_are_distinct() {
        let parent = tempfile::tempdir().unwrap();
        let runner = Runner::new(RunnerConfig {
            report_dir: Some(parent.path().to_path_buf()),
            ..Default::default()
        });
        let a = runner.create_run_dir().unwrap();
        let b = runner.create_run_dir().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(parent.path()));
    }

    #[tokio::test]
    async fn test_missing_analyzer_is_tool_not_found() {
        let runner = Runner::new(RunnerConfig {
            analyzer_binary: PathBuf::from("/nonexistent/memcheck-analyzer"),
            ..Default::default()
        });
        let err = runner.run(&Invocation::new("true"), ReportFormat::Xml).await.unwrap_err();
        assert!(matches!(err, HarnessError::ToolNotFound(_)));
        assert!(err.is_fatal());
    }
}
