//! Memcheck XML report parsing.
//!
//! Parses the `--xml=yes` output format (protocol version 4). Every `<error>`
//! element becomes one [`Defect`] in document order. Unknown error kinds are
//! kept as [`DefectKind::Other`]. A document that cannot be trusted is an
//! error, never an empty defect list.

use roxmltree::{Document, Node};

use super::defect::{AuxStack, Defect, DefectKind, Frame};
use super::raw::RawReport;
use super::suppression::{GeneratedSuppression, SuppressionFrame};
use crate::error::{HarnessError, Result};

/// Protocol version this parser was written against.
pub const PROTOCOL_VERSION: u32 = 4;

const ROOT_TAG: &str = "valgrindoutput";
const CLOSING_TAG: &str = "</valgrindoutput>";

/// Defects from a single analyzed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub pid: Option<u32>,
    pub defects: Vec<Defect>,
}

/// Parse every document of a run, concatenated in pid order.
pub fn parse_report(raw: &RawReport) -> Result<Vec<Defect>> {
    let mut defects = Vec::new();
    for document in &raw.documents {
        let parsed = parse_document(&document.xml)?;
        let pid = parsed.pid.or(document.pid);
        defects.extend(parsed.defects.into_iter().map(|mut d| {
            d.pid = d.pid.or(pid);
            d
        }));
    }
    tracing::debug!(
        documents = raw.documents.len(),
        defects = defects.len(),
        "parsed analyzer report"
    );
    Ok(defects)
}

/// Parse one Memcheck XML document.
pub fn parse_document(xml: &str) -> Result<ParsedDocument> {
    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) if !xml.contains(CLOSING_TAG) => {
            return Err(HarnessError::IncompleteReport(format!(
                "report ends before {} ({})",
                CLOSING_TAG, e
            )));
        }
        Err(e) => return Err(HarnessError::malformed(e.to_string(), xml)),
    };

    let root = doc.root_element();
    if !root.has_tag_name(ROOT_TAG) {
        return Err(HarnessError::malformed(
            format!("unexpected root element <{}>", root.tag_name().name()),
            xml,
        ));
    }

    if let Some(version) = child_text(root, "protocolversion").and_then(|v| v.parse::<u32>().ok()) {
        if version != PROTOCOL_VERSION {
            tracing::warn!(version, expected = PROTOCOL_VERSION, "unexpected analyzer protocol version");
        }
    }

    let finished = root
        .children()
        .filter(|n| n.has_tag_name("status"))
        .last()
        .is_some_and(|n| child_text(n, "state") == Some("FINISHED"));
    if !finished {
        return Err(HarnessError::IncompleteReport(
            "analyzed process never reached FINISHED state".into(),
        ));
    }

    let pid = child_text(root, "pid").and_then(|p| p.parse::<u32>().ok());
    let defects = root
        .children()
        .filter(|n| n.has_tag_name("error"))
        .map(|n| parse_error(n, xml))
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedDocument { pid, defects })
}

fn parse_error(node: Node<'_, '_>, xml: &str) -> Result<Defect> {
    let raw_kind = child_text(node, "kind")
        .ok_or_else(|| HarnessError::malformed("<error> without <kind>", xml))?;
    let kind = DefectKind::from_analyzer(raw_kind);
    let xwhat = child(node, "xwhat");

    let message = xwhat
        .and_then(|x| child_text(x, "text"))
        .or_else(|| child_text(node, "what"))
        .unwrap_or(raw_kind)
        .to_string();

    let size_bytes = xwhat
        .and_then(|x| child_text(x, "leakedbytes"))
        .and_then(|b| b.parse::<u64>().ok())
        .or_else(|| access_size(&message));

    let mut primary: Option<Vec<Frame>> = None;
    let mut aux = Vec::new();
    let mut caption: Option<String> = None;
    for item in node.children().filter(Node::is_element) {
        match item.tag_name().name() {
            "auxwhat" => {
                if let Some(previous) = caption.replace(node_text(item).to_string()) {
                    aux.push(AuxStack { caption: previous, frames: Vec::new() });
                }
            }
            "xauxwhat" => {
                let text = child_text(item, "text").unwrap_or_default().to_string();
                if let Some(previous) = caption.replace(text) {
                    aux.push(AuxStack { caption: previous, frames: Vec::new() });
                }
            }
            "stack" => {
                let frames = parse_stack(item);
                if primary.is_none() {
                    primary = Some(frames);
                } else {
                    aux.push(AuxStack {
                        caption: caption.take().unwrap_or_default(),
                        frames,
                    });
                }
            }
            _ => {}
        }
    }
    if let Some(trailing) = caption {
        aux.push(AuxStack { caption: trailing, frames: Vec::new() });
    }

    let mut defect = Defect::new(kind, message, primary.unwrap_or_default());
    defect.size_bytes = size_bytes;
    defect.aux = aux;
    defect.unique = child_text(node, "unique").map(str::to_string);
    defect.suppression = child(node, "suppression").map(parse_suppression);
    Ok(defect)
}

fn parse_stack(node: Node<'_, '_>) -> Vec<Frame> {
    node.children()
        .filter(|n| n.has_tag_name("frame"))
        .map(|f| Frame {
            symbol: child_text(f, "fn").map(str::to_string),
            module_path: child_text(f, "obj").map(str::to_string),
            file: child_text(f, "file").map(str::to_string),
            line: child_text(f, "line").and_then(|l| l.parse::<u32>().ok()),
            ip: child_text(f, "ip").map(str::to_string),
        })
        .collect()
}

fn parse_suppression(node: Node<'_, '_>) -> GeneratedSuppression {
    let frames = node
        .children()
        .filter(|n| n.has_tag_name("sframe"))
        .filter_map(|sf| {
            if let Some(fun) = child_text(sf, "fun") {
                Some(if fun == "..." {
                    SuppressionFrame::Ellipsis
                } else {
                    SuppressionFrame::Fun(fun.to_string())
                })
            } else {
                child_text(sf, "obj").map(|obj| SuppressionFrame::Obj(obj.to_string()))
            }
        })
        .collect();

    GeneratedSuppression {
        name: child_text(node, "sname").unwrap_or("insert_a_suppression_name_here").to_string(),
        kind: child_text(node, "skind").unwrap_or_default().to_string(),
        aux: child_text(node, "skaux").map(str::to_string),
        frames,
    }
}

/// Extract `N` from "Invalid write of size N".
fn access_size(message: &str) -> Option<u64> {
    let (_, rest) = message.split_once("of size ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<&'a str> {
    child(node, name)
        .map(node_text)
        .filter(|t| !t.is_empty())
}

fn node_text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().map(str::trim).unwrap_or_default()
}
