//! Fuzz target for Memcheck XML report parsing.
//!
//! Arbitrary input must yield defects or an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use native_memcheck::report::parse_document;

fuzz_target!(|data: &[u8]| {
    if let Ok(xml) = std::str::from_utf8(data) {
        let _ = parse_document(xml);
    }
});
