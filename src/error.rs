//! Harness error types.
//!
//! Memory defects are never errors: they travel as data inside a
//! [`TestOutcome`](crate::attribution::TestOutcome). The variants here describe
//! runs that could not produce a trustworthy report. None of them may be read
//! as "zero defects".

use thiserror::Error;

/// Maximum number of raw bytes kept for diagnostics in error messages.
pub const EXCERPT_LIMIT: usize = 512;

/// Errors raised while driving or interpreting an analyzer run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Analyzer binary not found: {0}")]
    ToolNotFound(String),

    #[error("Incomplete report: {0}")]
    IncompleteReport(String),

    #[error("Malformed report: {reason} (excerpt: {excerpt:?})")]
    MalformedReport { reason: String, excerpt: String },

    #[error("Analyzer failed with exit code {code:?}: {stderr}")]
    AnalyzerFailure { code: Option<i32>, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Build a `MalformedReport` keeping a bounded excerpt of the raw input.
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedReport {
            reason: reason.into(),
            excerpt: excerpt(raw),
        }
    }

    /// Returns true if this error must abort the whole session rather than
    /// a single run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolNotFound(_) | Self::Config(_))
    }

    /// Returns true if the subject never got to finish its report.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteReport(_))
    }
}

/// Cut `raw` down to at most [`EXCERPT_LIMIT`] bytes on a char boundary.
pub fn excerpt(raw: &str) -> String {
    if raw.len() <= EXCERPT_LIMIT {
        return raw.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(HarnessError::ToolNotFound("valgrind".into()).is_fatal());
        assert!(HarnessError::Config("bad rule".into()).is_fatal());
        assert!(!HarnessError::IncompleteReport("timeout".into()).is_fatal());
        assert!(!HarnessError::malformed("no root", "<x>").is_fatal());
        assert!(!HarnessError::AnalyzerFailure { code: Some(1), stderr: String::new() }.is_fatal());
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let raw = "é".repeat(EXCERPT_LIMIT);
        let cut = excerpt(&raw);
        assert!(cut.len() <= EXCERPT_LIMIT + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_short_excerpt_is_verbatim() {
        assert_eq!(excerpt("<valgrindoutput>"), "<valgrindoutput>");
    }
}
