#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Must not panic. Every record span has to lie inside the input.
        for record in datev_lint::parser::Tokenizer::new(s) {
            let span = match record {
                Ok(r) => r.span,
                Err(e) => e.span,
            };
            assert!(span.start <= span.end && span.end <= s.len());
        }
    }
});
