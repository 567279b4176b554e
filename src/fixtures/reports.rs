//! Synthetic Memcheck reports for the fixture entry points.
//!
//! Each report mirrors what Memcheck writes for the corresponding fixture
//! call on a Ruby built with `--enable-shared`, so the whole pipeline can be
//! checked against known answers without running the analyzer.

use std::fmt::Write;

use super::{EntryPoint, Fixture, RuntimeCallback};
use crate::report::RawReport;

pub const VG_PRELOAD: &str = "/usr/libexec/valgrind/vgpreload_memcheck-amd64-linux.so";
pub const RUBY_BINARY: &str = "/usr/local/bin/ruby";
pub const LIBRUBY: &str = "/usr/local/lib/libruby.so.3.3.0";

const PID: u32 = 4242;

/// One `<frame>` of a synthetic stack.
#[derive(Debug, Clone)]
pub struct XmlFrame {
    pub function: String,
    pub object: String,
    pub file: Option<(String, u32)>,
}

impl XmlFrame {
    pub fn new(function: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            object: object.into(),
            file: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some((file.into(), line));
        self
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn write_stack(out: &mut String, frames: &[XmlFrame]) {
    out.push_str("  <stack>\n");
    for (i, frame) in frames.iter().enumerate() {
        let _ = write!(
            out,
            "    <frame>\n      <ip>0x{:08X}</ip>\n      <obj>{}</obj>\n      <fn>{}</fn>\n",
            0x4848_0000 + i * 0x40,
            escape(&frame.object),
            escape(&frame.function)
        );
        if let Some((file, line)) = &frame.file {
            let _ = write!(out, "      <file>{}</file>\n      <line>{}</line>\n", escape(file), line);
        }
        out.push_str("    </frame>\n");
    }
    out.push_str("  </stack>\n");
}

/// A leak `<error>` element.
pub fn leak_error(unique: u32, kind: &str, bytes: u64, frames: &[XmlFrame]) -> String {
    let kind_text = match kind {
        "Leak_IndirectlyLost" => "indirectly",
        _ => "definitely",
    };
    let mut out = String::new();
    let _ = write!(
        out,
        "<error>\n  <unique>0x{:x}</unique>\n  <tid>1</tid>\n  <kind>{}</kind>\n  <xwhat>\n    <text>{} bytes in 1 blocks are {} lost in loss record {} of 4</text>\n    <leakedbytes>{}</leakedbytes>\n    <leakedblocks>1</leakedblocks>\n  </xwhat>\n",
        unique, kind, bytes, kind_text, unique, bytes
    );
    write_stack(&mut out, frames);
    out.push_str("</error>\n");
    out
}

/// A non-leak `<error>` element with an optional auxiliary stack.
pub fn access_error(
    unique: u32,
    kind: &str,
    what: &str,
    frames: &[XmlFrame],
    aux: Option<(&str, &[XmlFrame])>,
) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<error>\n  <unique>0x{:x}</unique>\n  <tid>1</tid>\n  <kind>{}</kind>\n  <what>{}</what>\n",
        unique,
        kind,
        escape(what)
    );
    write_stack(&mut out, frames);
    if let Some((caption, aux_frames)) = aux {
        let _ = writeln!(out, "  <auxwhat>{}</auxwhat>", escape(caption));
        write_stack(&mut out, aux_frames);
    }
    out.push_str("</error>\n");
    out
}

/// Wrap error elements in a complete, finished document.
pub fn document(pid: u32, errors: &[String]) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<?xml version=\"1.0\"?>\n\n<valgrindoutput>\n\n<protocolversion>4</protocolversion>\n<protocoltool>memcheck</protocoltool>\n\n<pid>{}</pid>\n<ppid>1</ppid>\n<tool>memcheck</tool>\n\n<status>\n  <state>RUNNING</state>\n  <time>00:00:00:00.071 </time>\n</status>\n\n",
        pid
    );
    for error in errors {
        out.push_str(error);
        out.push('\n');
    }
    out.push_str("<status>\n  <state>FINISHED</state>\n  <time>00:00:00:02.512 </time>\n</status>\n\n</valgrindoutput>\n");
    out
}

fn ruby_caller() -> Vec<XmlFrame> {
    vec![
        XmlFrame::new("vm_call_cfunc_with_frame", LIBRUBY).at("vm_insnhelper.c", 3490),
        XmlFrame::new("vm_exec_core", LIBRUBY).at("insns.def", 877),
        XmlFrame::new("rb_vm_exec", LIBRUBY).at("vm.c", 2486),
        XmlFrame::new("ruby_run_node", LIBRUBY).at("eval.c", 327),
        XmlFrame::new("main", RUBY_BINARY).at("main.c", 47),
    ]
}

fn require_caller() -> Vec<XmlFrame> {
    vec![
        XmlFrame::new("dln_load", LIBRUBY).at("dln.c", 491),
        XmlFrame::new("rb_require_string", LIBRUBY).at("load.c", 1252),
        XmlFrame::new("ruby_run_node", LIBRUBY).at("eval.c", 327),
        XmlFrame::new("main", RUBY_BINARY).at("main.c", 47),
    ]
}

/// Stack of the 100-byte allocation made by `function` in the fixture module.
fn allocation_stack(fixture: &Fixture, function: &str, line: u32, caller: Vec<XmlFrame>) -> Vec<XmlFrame> {
    let module = fixture.module();
    let mut frames = vec![XmlFrame::new("malloc", VG_PRELOAD).at("vg_replace_malloc.c", 393)];
    if let Some(helper) = module.leak_helper() {
        frames.push(XmlFrame::new(helper, module.object_path()).at(module.source_file(), module.lines().helper_malloc));
    }
    frames.push(XmlFrame::new(function, module.object_path()).at(module.source_file(), line));
    frames.extend(caller);
    frames
}

fn init_leak(fixture: &Fixture, unique: u32) -> Option<String> {
    let module = fixture.module();
    if !module.init_leaks() {
        return None;
    }
    let frames = allocation_stack(fixture, module.id().init_symbol(), module.lines().init_leak, require_caller());
    Some(leak_error(unique, "Leak_DefinitelyLost", 100, &frames))
}

/// Errors Memcheck reports when the fixture module is loaded and `entry`
/// is called once.
pub fn synthetic_errors(fixture: &Fixture) -> Vec<String> {
    let module = fixture.module();
    let obj = module.object_path();
    let src = module.source_file();
    let lines = module.lines();
    let symbol = fixture.symbol();
    let mut errors: Vec<String> = init_leak(fixture, 1).into_iter().collect();

    match fixture.entry() {
        EntryPoint::ModuleInit | EntryPoint::NoMemoryLeak => {}
        EntryPoint::MemoryLeak => {
            let frames = allocation_stack(fixture, &symbol, lines.memory_leak, ruby_caller());
            errors.push(leak_error(2, "Leak_DefinitelyLost", 100, &frames));
        }
        EntryPoint::UseAfterFree => {
            let mut frames = vec![XmlFrame::new(symbol.as_str(), obj.as_str()).at(&src, lines.use_after_free)];
            frames.extend(ruby_caller());
            let mut freed = vec![
                XmlFrame::new("free", VG_PRELOAD).at("vg_replace_malloc.c", 884),
                XmlFrame::new(symbol.as_str(), obj.as_str()).at(&src, lines.use_after_free - 1),
            ];
            freed.extend(ruby_caller());
            errors.push(access_error(
                2,
                "InvalidWrite",
                "Invalid write of size 1",
                &frames,
                Some(("Address 0x4a9c040 is 0 bytes inside a block of size 100 free'd", freed.as_slice())),
            ));
        }
        EntryPoint::UninitializedValue => {
            let mut frames = vec![XmlFrame::new(symbol.as_str(), obj.as_str()).at(&src, lines.uninitialized_value)];
            frames.extend(ruby_caller());
            let mut origin = vec![XmlFrame::new(symbol.as_str(), obj.as_str()).at(&src, lines.uninitialized_value - 2)];
            origin.extend(ruby_caller());
            errors.push(access_error(
                2,
                "UninitCondition",
                "Conditional jump or move depends on uninitialised value(s)",
                &frames,
                Some(("Uninitialised value was created by a stack allocation", origin.as_slice())),
            ));
        }
        EntryPoint::CallIntoRubyMemLeak => {
            let caller = XmlFrame::new(symbol.as_str(), obj.as_str()).at(&src, lines.call_into_ruby_mem_leak);
            let (kind, bytes, mut frames) = match module.callback() {
                RuntimeCallback::Intern => (
                    "Leak_IndirectlyLost",
                    2048,
                    vec![
                        XmlFrame::new("malloc", VG_PRELOAD).at("vg_replace_malloc.c", 393),
                        XmlFrame::new("objspace_xmalloc0", LIBRUBY).at("gc.c", 12631),
                        XmlFrame::new("rb_id_table_insert", LIBRUBY).at("id_table.c", 257),
                        XmlFrame::new("register_static_symid_str", LIBRUBY).at("symbol.c", 631),
                        XmlFrame::new("intern_str", LIBRUBY).at("symbol.c", 806),
                        XmlFrame::new("rb_intern3", LIBRUBY).at("symbol.c", 747),
                        XmlFrame::new("rb_intern", LIBRUBY).at("symbol.c", 774),
                        caller,
                    ],
                ),
                RuntimeCallback::EvalString => (
                    "Leak_DefinitelyLost",
                    10_001,
                    vec![
                        XmlFrame::new("malloc", VG_PRELOAD).at("vg_replace_malloc.c", 393),
                        XmlFrame::new("objspace_xmalloc0", LIBRUBY).at("gc.c", 12631),
                        XmlFrame::new("rb_str_buf_new", LIBRUBY).at("string.c", 1556),
                        XmlFrame::new("rb_str_s_new", LIBRUBY).at("string.c", 1849),
                        XmlFrame::new("vm_exec_core", LIBRUBY).at("insns.def", 877),
                        XmlFrame::new("eval_string_with_cref", LIBRUBY).at("vm_eval.c", 1998),
                        XmlFrame::new("rb_eval_string", LIBRUBY).at("vm_eval.c", 2039),
                        caller,
                    ],
                ),
            };
            frames.extend(ruby_caller());
            errors.push(leak_error(2, kind, bytes, &frames));
        }
    }
    errors
}

/// Complete single-process report for `fixture`.
pub fn synthetic_report(fixture: &Fixture) -> RawReport {
    RawReport::single(document(PID, &synthetic_errors(fixture)))
}

/// A report Memcheck would leave behind if the subject were killed mid-run.
pub fn truncated_report(fixture: &Fixture) -> RawReport {
    let full = document(PID, &synthetic_errors(fixture));
    let cut = full.find("<status>\n  <state>FINISHED").unwrap_or(full.len() / 2);
    RawReport::single(&full[..cut])
}

/// Leak entirely inside the runtime, with no extension frame on the stack.
pub fn runtime_only_leak() -> String {
    let frames = vec![
        XmlFrame::new("malloc", VG_PRELOAD).at("vg_replace_malloc.c", 393),
        XmlFrame::new("objspace_xmalloc0", LIBRUBY).at("gc.c", 12631),
        XmlFrame::new("rb_intern3", LIBRUBY).at("symbol.c", 747),
        XmlFrame::new("Init_BareVM", LIBRUBY).at("vm.c", 4065),
        XmlFrame::new("ruby_setup", LIBRUBY).at("eval.c", 89),
        XmlFrame::new("main", RUBY_BINARY).at("main.c", 47),
    ];
    leak_error(9, "Leak_DefinitelyLost", 64, &frames)
}
