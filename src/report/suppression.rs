//! Analyzer-generated suppressions (`--gen-suppressions=all`).
//!
//! Rendered in the `.supp` syntax so a reviewer can paste them straight into
//! a suppressions file.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One `sframe` line of a suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionFrame {
    Fun(String),
    Obj(String),
    /// `...`: any number of frames.
    Ellipsis,
}

impl fmt::Display for SuppressionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fun(name) => write!(f, "fun:{}", name),
            Self::Obj(path) => write!(f, "obj:{}", path),
            Self::Ellipsis => f.write_str("..."),
        }
    }
}

/// A suppression block emitted by the analyzer for one error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSuppression {
    pub name: String,
    pub kind: String,
    pub aux: Option<String>,
    pub frames: Vec<SuppressionFrame>,
}

impl fmt::Display for GeneratedSuppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "  {}", self.name)?;
        writeln!(f, "  {}", self.kind)?;
        if let Some(aux) = &self.aux {
            writeln!(f, "  {}", aux)?;
        }
        for frame in &self.frames {
            writeln!(f, "  {}", frame)?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_supp_syntax() {
        let supp = GeneratedSuppression {
            name: "insert_a_suppression_name_here".into(),
            kind: "Memcheck:Leak".into(),
            aux: Some("match-leak-kinds: definite".into()),
            frames: vec![
                SuppressionFrame::Fun("malloc".into()),
                SuppressionFrame::Fun("objspace_xmalloc0".into()),
                SuppressionFrame::Obj("/usr/lib/libX11.so.6.3.0".into()),
                SuppressionFrame::Ellipsis,
            ],
        };
        let expected = "{\n  insert_a_suppression_name_here\n  Memcheck:Leak\n  match-leak-kinds: definite\n  fun:malloc\n  fun:objspace_xmalloc0\n  obj:/usr/lib/libX11.so.6.3.0\n  ...\n}\n";
        assert_eq!(supp.to_string(), expected);
    }

    #[test]
    fn test_aux_line_is_optional() {
        let supp = GeneratedSuppression {
            name: "uaf".into(),
            kind: "Memcheck:Addr1".into(),
            aux: None,
            frames: vec![SuppressionFrame::Fun("use_after_free".into())],
        };
        assert_eq!(supp.to_string(), "{\n  uaf\n  Memcheck:Addr1\n  fun:use_after_free\n}\n");
    }
}
