//! Fuzz target for rules file parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use native_memcheck::suppress::parse_rules;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_rules(text);
    }
});
