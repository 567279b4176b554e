//! Plain-text rendering of defects.
//!
//! ```text
//! [definitely_lost, 100 bytes] 100 bytes in 1 blocks are definitely lost in loss record 1 of 1
//!   malloc (at /usr/libexec/valgrind/vgpreload_memcheck-amd64-linux.so)
//!  *allocate_memory_leak (ruby_memcheck_c_test.c:8)
//!  *memory_leak (ruby_memcheck_c_test.c:14)
//!   vm_call_cfunc (vm_insnhelper.c:3490)
//! ```

use std::fmt::Write;

use crate::report::{Defect, Frame};
use crate::subject::ModuleId;

/// Marker for frames executing in the extension under test.
pub const EXTENSION_FRAME_MARKER: &str = " *";
const FRAME_INDENT: &str = "  ";

fn push_frames(out: &mut String, frames: &[Frame], module: &ModuleId) {
    for frame in frames {
        let lead = if module.owns(frame) {
            EXTENSION_FRAME_MARKER
        } else {
            FRAME_INDENT
        };
        let _ = writeln!(out, "{}{}", lead, frame);
    }
}

/// `[kind]` or `[kind, N bytes]`.
fn header(defect: &Defect) -> String {
    match defect.size_bytes {
        Some(1) => format!("[{}, 1 byte]", defect.kind),
        Some(n) => format!("[{}, {} bytes]", defect.kind, n),
        None => format!("[{}]", defect.kind),
    }
}

/// Render one defect: kind and size with the message, stack, auxiliary
/// stacks, then the generated suppression if the analyzer produced one.
pub fn render_defect(defect: &Defect, module: &ModuleId) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", header(defect), defect.message);
    push_frames(&mut out, &defect.stack, module);

    for aux in &defect.aux {
        out.push_str(&aux.caption);
        out.push('\n');
        push_frames(&mut out, &aux.frames, module);
    }

    if let Some(suppression) = &defect.suppression {
        for line in suppression.to_string().lines() {
            let _ = writeln!(out, "{}{}", FRAME_INDENT, line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AuxStack, DefectKind, GeneratedSuppression, SuppressionFrame};

    const EXT: &str = "/ext/ruby_memcheck_c_test.so";

    #[test]
    fn test_extension_frames_marked() {
        let module = ModuleId::new("ruby_memcheck_c_test");
        let defect = Defect::new(
            DefectKind::DefinitelyLost,
            "100 bytes in 1 blocks are definitely lost in loss record 1 of 1",
            vec![
                Frame::new("malloc", "/vg/vgpreload_memcheck.so"),
                Frame::new("allocate_memory_leak", EXT).at("ruby_memcheck_c_test.c", 8),
                Frame::unresolved(),
            ],
        )
        .with_size(100);
        let text = render_defect(&defect, &module);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "[definitely_lost, 100 bytes] 100 bytes in 1 blocks are definitely lost in loss record 1 of 1"
        );
        assert_eq!(lines[1], "  malloc (at /vg/vgpreload_memcheck.so)");
        assert_eq!(lines[2], " *allocate_memory_leak (ruby_memcheck_c_test.c:8)");
        assert_eq!(lines[3], "  <unknown stack frame>");
    }

    #[test]
    fn test_same_symbol_other_module_not_marked() {
        let module = ModuleId::new("ruby_memcheck_c_test_one");
        let defect = Defect::new(
            DefectKind::DefinitelyLost,
            "lost",
            vec![Frame::new("memory_leak", "/ext/ruby_memcheck_c_test_two.so")],
        );
        let text = render_defect(&defect, &module);
        assert!(text.contains("\n  memory_leak"));
        assert!(!text.contains(" *"));
    }

    #[test]
    fn test_aux_and_suppression_sections() {
        let module = ModuleId::new("ruby_memcheck_c_test");
        let mut defect = Defect::new(
            DefectKind::InvalidWrite,
            "Invalid write of size 1",
            vec![Frame::new("use_after_free", EXT)],
        );
        defect.aux.push(AuxStack {
            caption: "Address 0x4a8b040 is 0 bytes inside a block of size 100 free'd".into(),
            frames: vec![Frame::new("free", "/vg/vgpreload_memcheck.so")],
        });
        defect.suppression = Some(GeneratedSuppression {
            name: "<insert_a_suppression_name_here>".into(),
            kind: "Memcheck:Addr1".into(),
            aux: None,
            frames: vec![SuppressionFrame::Fun("use_after_free".into())],
        });
        let text = render_defect(&defect, &module);
        assert!(text.contains("free'd\n  free (at /vg/vgpreload_memcheck.so)\n"));
        assert!(text.contains("  {\n"));
        assert!(text.contains("    fun:use_after_free\n"));
        assert!(text.starts_with("[invalid_write] Invalid write of size 1\n"));
    }

    #[test]
    fn test_header_names_kind_without_size() {
        let module = ModuleId::new("ruby_memcheck_c_test");
        let uninit = Defect::new(
            DefectKind::UninitializedValueUse,
            "Conditional jump or move depends on uninitialised value(s)",
            vec![Frame::new("uninitialized_value", EXT)],
        );
        assert!(render_defect(&uninit, &module)
            .starts_with("[uninitialized_value_use] Conditional jump"));

        let other = Defect::new(
            DefectKind::Other("Leak_PossiblyLost".into()),
            "24 bytes in 1 blocks are possibly lost",
            vec![Frame::new("malloc", "/vg/vgpreload_memcheck.so")],
        )
        .with_size(24);
        assert!(render_defect(&other, &module).starts_with("[Leak_PossiblyLost, 24 bytes] 24 bytes"));
    }
}
