//! Identity of the extension under test and the invocation that exercises it.
//!
//! A [`ModuleId`] is carried through every stage of a run. Frames are
//! attributed to the extension by comparing the file stem of their object
//! path with the module's binary name, never by symbol name: two fixture
//! modules may both export `memory_leak`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::report::Frame;

/// Identity of one native extension under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    binary_name: String,
    init_symbol: String,
}

impl ModuleId {
    /// Identify a module by the file stem of its shared object
    /// (`ruby_memcheck_c_test_one` for `ruby_memcheck_c_test_one.so`).
    ///
    /// The init entry point defaults to `Init_<binary_name>`.
    pub fn new(binary_name: impl Into<String>) -> Self {
        let binary_name = binary_name.into();
        let init_symbol = format!("Init_{}", binary_name);
        Self {
            binary_name,
            init_symbol,
        }
    }

    /// Override the one-time initialization entry point.
    pub fn with_init_symbol(mut self, init_symbol: impl Into<String>) -> Self {
        self.init_symbol = init_symbol.into();
        self
    }

    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    pub fn init_symbol(&self) -> &str {
        &self.init_symbol
    }

    /// Returns true if `frame` executes code from this module's binary.
    pub fn owns(&self, frame: &Frame) -> bool {
        frame.object_stem() == Some(self.binary_name.as_str())
    }

    /// Returns true if `frame` is this module's init entry point.
    pub fn is_init_frame(&self, frame: &Frame) -> bool {
        self.owns(frame) && frame.symbol.as_deref() == Some(self.init_symbol.as_str())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.binary_name)
    }
}

/// The subject process to run under the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}
