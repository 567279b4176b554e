//! Raw analyzer output as collected by the runner.

/// The XML report written by one analyzed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    /// Process id taken from the report file name, if it carried one.
    pub pid: Option<u32>,
    pub xml: String,
}

impl ReportDocument {
    pub fn new(pid: Option<u32>, xml: impl Into<String>) -> Self {
        Self {
            pid,
            xml: xml.into(),
        }
    }
}

/// Everything one analyzer run produced.
///
/// With `--trace-children=yes` every traced process writes its own document;
/// they all belong to the same run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReport {
    /// Documents ordered by pid.
    pub documents: Vec<ReportDocument>,
    /// Exit code of the analyzer process, `None` if it died by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    pub stderr: String,
}

impl RawReport {
    /// Build a report from documents, sorting them into pid order.
    pub fn from_documents(mut documents: Vec<ReportDocument>) -> Self {
        documents.sort_by_key(|d| d.pid);
        Self {
            documents,
            exit_code: Some(0),
            signal: None,
            stderr: String::new(),
        }
    }

    /// Convenience for a single-process report.
    pub fn single(xml: impl Into<String>) -> Self {
        Self::from_documents(vec![ReportDocument::new(None, xml)])
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_signal(mut self, signal: Option<i32>) -> Self {
        self.signal = signal;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
