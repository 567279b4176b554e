//! Analyzer report model and parser.
//!
//! Turns the raw XML written by Memcheck into ordered [`Defect`] records.

pub mod defect;
pub mod parser;
pub mod raw;
pub mod suppression;

pub use defect::{AuxStack, Defect, DefectKind, Frame, UNRESOLVED_SYMBOL};
pub use parser::{parse_document, parse_report, ParsedDocument, PROTOCOL_VERSION};
pub use raw::{RawReport, ReportDocument};
pub use suppression::{GeneratedSuppression, SuppressionFrame};
