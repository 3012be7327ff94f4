#![no_main]

use std::sync::OnceLock;

use datev_lint::rules::{ExecutionPipeline, RuleRegistry};
use libfuzzer_sys::fuzz_target;

fn pipeline() -> &'static ExecutionPipeline {
    static PIPELINE: OnceLock<ExecutionPipeline> = OnceLock::new();
    PIPELINE.get_or_init(|| {
        let registry = RuleRegistry::builtin().unwrap();
        ExecutionPipeline::new(&registry, "de.skr03.default").unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    let result = pipeline().run(data, "fuzz.csv");
    // A fatal finding always ends the run.
    if result.findings.iter().any(|f| f.is_fatal()) {
        assert!(result.is_aborted());
    }
});
