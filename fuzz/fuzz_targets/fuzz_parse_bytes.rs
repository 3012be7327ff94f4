#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Errors are fine, panics are bugs.
    if let Ok(parsed) = datev_lint::parser::parse_bytes(data, "fuzz.csv") {
        for row in parsed.rows {
            let _ = row;
        }
    }
});
