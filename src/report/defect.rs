//! Defect records produced by the report parser.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::suppression::GeneratedSuppression;

/// Placeholder shown for frames whose symbol could not be resolved.
pub const UNRESOLVED_SYMBOL: &str = "<unresolved>";

/// Category of a reported defect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    DefinitelyLost,
    IndirectlyLost,
    InvalidWrite,
    InvalidRead,
    UninitializedValueUse,
    /// Any analyzer kind without a dedicated variant, kept verbatim.
    Other(String),
}

impl DefectKind {
    /// Map a Memcheck `<kind>` string.
    pub fn from_analyzer(kind: &str) -> Self {
        match kind {
            "Leak_DefinitelyLost" => Self::DefinitelyLost,
            "Leak_IndirectlyLost" => Self::IndirectlyLost,
            "InvalidWrite" => Self::InvalidWrite,
            "InvalidRead" => Self::InvalidRead,
            "UninitCondition" | "UninitValue" => Self::UninitializedValueUse,
            other => Self::Other(other.to_string()),
        }
    }

    /// Parse the snake_case name used in rules files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "definitely_lost" => Some(Self::DefinitelyLost),
            "indirectly_lost" => Some(Self::IndirectlyLost),
            "invalid_write" => Some(Self::InvalidWrite),
            "invalid_read" => Some(Self::InvalidRead),
            "uninitialized_value_use" => Some(Self::UninitializedValueUse),
            _ => None,
        }
    }

    /// Returns true for the leak kinds, the only ones a rule may suppress.
    pub fn is_leak(&self) -> bool {
        matches!(self, Self::DefinitelyLost | Self::IndirectlyLost)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::DefinitelyLost => "definitely_lost",
            Self::IndirectlyLost => "indirectly_lost",
            Self::InvalidWrite => "invalid_write",
            Self::InvalidRead => "invalid_read",
            Self::UninitializedValueUse => "uninitialized_value_use",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call-stack entry, as symbolized by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub symbol: Option<String>,
    /// Path of the binary or shared object the frame executes in.
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub ip: Option<String>,
}

impl Frame {
    /// A frame with nothing resolved.
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// Convenience constructor for a symbolized frame in `object`.
    pub fn new(symbol: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            module_path: Some(object.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.symbol.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Symbol name, or [`UNRESOLVED_SYMBOL`].
    pub fn display_symbol(&self) -> &str {
        match self.symbol.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => UNRESOLVED_SYMBOL,
        }
    }

    /// File name of the object path.
    pub fn object_name(&self) -> Option<&str> {
        let path = self.module_path.as_deref()?;
        Path::new(path).file_name()?.to_str()
    }

    /// Object file name with its last extension removed.
    pub fn object_stem(&self) -> Option<&str> {
        let path = self.module_path.as_deref()?;
        Path::new(path).file_stem()?.to_str()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.module_path) {
            (Some(file), _) => match self.line {
                Some(line) => write!(f, "{} ({}:{})", self.display_symbol(), file, line),
                None => write!(f, "{} ({})", self.display_symbol(), file),
            },
            (None, Some(obj)) => write!(f, "{} (at {})", self.display_symbol(), obj),
            (None, None) if self.is_resolved() => f.write_str(self.display_symbol()),
            (None, None) => match &self.ip {
                Some(ip) => write!(f, "<unknown stack frame> ({})", ip),
                None => f.write_str("<unknown stack frame>"),
            },
        }
    }
}

/// A secondary stack attached to a defect, such as the free or allocation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxStack {
    pub caption: String,
    pub frames: Vec<Frame>,
}

/// One memory error or leak reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    pub kind: DefectKind,
    pub size_bytes: Option<u64>,
    pub message: String,
    /// Innermost frame first; never empty.
    pub stack: Vec<Frame>,
    pub aux: Vec<AuxStack>,
    pub pid: Option<u32>,
    pub unique: Option<String>,
    pub suppression: Option<GeneratedSuppression>,
}

impl Defect {
    /// Create a defect. An empty stack is replaced by a single unresolved
    /// frame so the defect can still be reported.
    pub fn new(kind: DefectKind, message: impl Into<String>, mut stack: Vec<Frame>) -> Self {
        if stack.is_empty() {
            stack.push(Frame::unresolved());
        }
        Self {
            kind,
            size_bytes: None,
            message: message.into(),
            stack,
            aux: Vec::new(),
            pid: None,
            unique: None,
            suppression: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn innermost(&self) -> &Frame {
        &self.stack[0]
    }

    /// The innermost `n` frames (fewer if the stack is shorter).
    pub fn frame_prefix(&self, n: usize) -> &[Frame] {
        &self.stack[..n.min(self.stack.len())]
    }

    /// Returns true if none of the innermost `n` frames has a symbol.
    pub fn is_unresolved(&self, n: usize) -> bool {
        self.frame_prefix(n).iter().all(|f| !f.is_resolved())
    }
}
