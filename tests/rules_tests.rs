#![cfg(feature = "rules")]

use datev_lint::rules::*;
use datev_lint::{RuleError, Severity, Stage};

const HEAD: &str = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n";
const LABELS: &str = "Umsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum;Belegfeld 1;Buchungstext\r\n";

const HOUSE: &str = r#"
version: "1.2.0"
rules:
  - id: HOUSE-001
    title: Buchungstext zu kurz
    stage: policy
    severity: warn
    selector: { field: buchungstext }
    constraint: { type: min_length, value: 5 }
    message:
      en: "Booking text '{value}' is too short"
profiles:
  - id: house
    version: "2.0.0"
    base: de.skr03.default
    rules: { disable: ["DVL-POLICY-*"] }
    overrides:
      severity: { HOUSE-001: error }
"#;

fn file(rows: &[String]) -> String {
    let mut s = format!("{}{}", HEAD, LABELS);
    for r in rows {
        s.push_str(r);
        s.push_str("\r\n");
    }
    s
}

fn row(belegfeld: &str, text: &str) -> String {
    format!("100,00;S;1200;8400;1503;\"{}\";\"{}\"", belegfeld, text)
}

fn run(profile: &str, data: &str) -> PipelineResult {
    let registry = RuleRegistry::builtin().unwrap();
    ExecutionPipeline::new(&registry, profile)
        .unwrap()
        .with_language("en")
        .run(data.as_bytes(), "EXTF_Buchungsstapel.csv")
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

#[test]
fn duplicate_reported_once_at_later_row() {
    // Data rows start at row 3; rows 5 and 12 share a Belegfeld 1.
    let rows: Vec<String> = (3..=14)
        .map(|n| match n {
            5 | 12 => row("RE-DUP", "Wareneingang"),
            _ => row(&format!("RE{:03}", n), "Wareneingang"),
        })
        .collect();
    let result = run("de.skr03.default", &file(&rows));

    let dups: Vec<_> = result.with_code("DVL-CROSS-001").collect();
    assert_eq!(dups.len(), 1);
    let dup = dups[0];
    assert_eq!(dup.severity, Severity::Error);
    assert_eq!(dup.location.row_no, Some(12));
    assert_eq!(dup.location.field.as_deref(), Some("belegfeld1"));
    assert_eq!(dup.related.len(), 1);
    assert_eq!(dup.related[0].row_no, Some(5));
    assert_eq!(dup.message, "Belegfeld 1 'RE-DUP' already appears in row 5");
    assert_eq!(result.stats.rows_checked, 12);
}

#[test]
fn duplicate_severity_follows_profile() {
    let rows = vec![row("A1", "Miete Büro"), row("A1", "Miete Büro")];
    let data = file(&rows);
    assert_eq!(
        run("default", &data).with_code("DVL-CROSS-001").next().unwrap().severity,
        Severity::Warn
    );
    assert_eq!(
        run("de.datev700.bookingbatch", &data)
            .with_code("DVL-CROSS-001")
            .next()
            .unwrap()
            .severity,
        Severity::Error
    );
}

#[test]
fn each_repeat_points_at_the_first_occurrence() {
    let rows = vec![row("X", "Miete"), row("X", "Miete"), row("X", "Miete")];
    let result = run("default", &file(&rows));
    let related: Vec<_> = result
        .with_code("DVL-CROSS-001")
        .map(|f| (f.location.row_no, f.related[0].row_no))
        .collect();
    assert_eq!(related, vec![(Some(4), Some(3)), (Some(5), Some(3))]);
}

#[test]
fn empty_belegfeld_is_never_a_duplicate() {
    let rows = vec![row("", "Miete"), row("", "Miete")];
    let result = run("default", &file(&rows));
    assert_eq!(result.with_code("DVL-CROSS-001").count(), 0);
}

#[test]
fn detector_handles_many_distinct_values() {
    let mut detector = DuplicateDetector::new();
    let watch = detector.watch("belegfeld1", 10_000, 0.01);
    let data = file(
        &(0..2_000)
            .map(|n| row(&format!("R{}", n), "x"))
            .collect::<Vec<_>>(),
    );
    let parsed = datev_lint::parser::parse_bytes(data.as_bytes(), "a.csv").unwrap();
    for item in parsed.rows {
        detector.observe(&item.unwrap());
    }
    let again = datev_lint::parser::parse_bytes(data.as_bytes(), "a.csv").unwrap();
    let dups = detector.resolve(again.rows.filter_map(Result::ok));
    assert!(dups.is_empty());
    assert_eq!(watch, 0);
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[test]
fn builtin_profile_chain() {
    let registry = RuleRegistry::builtin().unwrap();
    let profile = registry.resolve_profile("de.skr03.default").unwrap();
    assert_eq!(
        profile.chain,
        vec!["default", "de.datev700.bookingbatch", "de.skr03.default"]
    );
    assert_eq!(
        profile.rule("DVL-CROSS-001").unwrap().rule.severity,
        Severity::Error
    );
    let mut ids: Vec<&str> = registry.profile_ids().collect();
    ids.sort_unstable();
    assert_eq!(
        ids,
        vec!["de.datev700.bookingbatch", "de.skr03.default", "de.skr04.default", "default"]
    );
}

#[test]
fn chart_params_follow_profile() {
    let head = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231;;;;;;\"EUR\";;;;;\"03\"\r\n";
    let data = format!("{}{}{}\r\n", head, LABELS, row("RE1", "Miete"));
    let registry = RuleRegistry::builtin().unwrap();
    let run = |profile: &str| {
        ExecutionPipeline::new(&registry, profile)
            .unwrap()
            .run(data.as_bytes(), "a.csv")
    };
    assert_eq!(run("de.skr03.default").with_code("DVL-HDR-013").count(), 0);
    let skr04 = run("de.skr04.default");
    let finding = skr04.with_code("DVL-HDR-013").next().unwrap();
    assert_eq!(finding.severity, Severity::Warn);
    assert_eq!(finding.location.field.as_deref(), Some("sachkontenrahmen"));
}

#[test]
fn unknown_profile_is_an_error() {
    let registry = RuleRegistry::builtin().unwrap();
    let err = ExecutionPipeline::new(&registry, "nope").unwrap_err();
    assert!(matches!(err, RuleError::UnknownProfile(ref id) if id == "nope"));
}

#[test]
fn profile_cycle_is_detected() {
    let mut registry = RuleRegistry::builtin().unwrap();
    registry
        .load_yaml_str(
            "loop.yaml",
            "profiles:\n  - id: a\n    base: b\n  - id: b\n    base: a\n",
        )
        .unwrap();
    match registry.resolve_profile("a") {
        Err(RuleError::ProfileCycle(path)) => assert_eq!(path, "a -> b -> a"),
        other => panic!("expected cycle, got {:?}", other.map(|p| p.id)),
    }
}

#[test]
fn invalid_rule_documents_are_rejected() {
    let mut registry = RuleRegistry::builtin().unwrap();
    let err = registry.load_yaml_str("bad.yaml", "rules: [").unwrap_err();
    assert!(matches!(err, RuleError::Yaml { .. }));

    let dup = "rules:\n  - id: DVL-REQ-001\n    stage: schema\n    severity: error\n    selector: { field: umsatz }\n    constraint: { type: required }\n";
    let err = registry.load_yaml_str("dup.yaml", dup).unwrap_err();
    assert!(matches!(err, RuleError::DuplicateRule(ref id) if id == "DVL-REQ-001"));
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

#[test]
fn plugin_directory_adds_rules_and_profiles() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("house.yaml"), HOUSE).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a rule file").unwrap();

    let mut registry = RuleRegistry::builtin().unwrap();
    assert_eq!(registry.load_directory(dir.path()).unwrap(), 1);
    assert_eq!(registry.plugins().len(), 1);
    assert!(registry.plugins()[0].ends_with("house.yaml@1.2.0"));
    assert_eq!(registry.ruleset_version(), "2025.1.0");

    let pipeline = ExecutionPipeline::new(&registry, "house").unwrap().with_language("en");
    let data = file(&[row("RE1", "Abc"), row("RE2", "")]);
    let result = pipeline.run(data.as_bytes(), "a.csv");

    assert_eq!(result.profile_id, "house");
    assert_eq!(result.profile_version, "2.0.0");
    assert_eq!(result.plugins, registry.plugins());
    let short = result.with_code("HOUSE-001").next().unwrap();
    assert_eq!(short.severity, Severity::Error);
    assert_eq!(short.message, "Booking text 'Abc' is too short");
    assert_eq!(short.location.row_no, Some(3));
    assert_eq!(result.with_code("HOUSE-001").count(), 1);
    assert_eq!(result.with_code("DVL-POLICY-002").count(), 0);
}

#[test]
fn plugin_rules_register_after_builtins() {
    let mut registry = RuleRegistry::builtin().unwrap();
    registry.load_yaml_str("house.yaml", HOUSE).unwrap();
    let builtin_last = registry.position("DVL-POLICY-002").unwrap();
    assert_eq!(registry.position("HOUSE-001"), Some(builtin_last + 1));
}

// ---------------------------------------------------------------------------
// Pipeline behaviour
// ---------------------------------------------------------------------------

#[test]
fn fatal_encoding_aborts_in_parse_stage() {
    // 0x81 is undefined in Windows-1252 and invalid UTF-8.
    let mut data = HEAD.as_bytes().to_vec();
    data.extend_from_slice(b"Umsatz\x81\r\n");
    let registry = RuleRegistry::builtin().unwrap();
    let result = ExecutionPipeline::new(&registry, "default")
        .unwrap()
        .run(&data, "a.csv");
    assert_eq!(result.aborted_at, Some(Stage::Parse));
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].code, "DVL-ENC-001");
    assert_eq!(result.findings[0].severity, Severity::Fatal);
}

#[test]
fn missing_required_column_is_reported_once() {
    let data = format!("{}Umsatz;Soll/Haben-Kennzeichen;Gegenkonto;Belegdatum\r\n1,00;S;8400;1503\r\n2,00;S;8400;1503\r\n", HEAD);
    let result = run("default", &data);
    assert_eq!(result.with_code("DVL-COL-001").count(), 1);
    assert_eq!(result.with_code("DVL-REQ-003").count(), 0);
}

#[test]
fn later_stages_run_after_errors() {
    let data = file(&["abc;X;1200;8400;1503;\"re 1\";\"\"".to_string()]);
    let result = run("default", &data);
    assert!(result.has_errors());
    assert!(!result.is_aborted());
    let stages: Vec<&str> = result.findings.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(stages.first(), Some(&"DVL-FIELD-003"));
    assert_eq!(stages.last(), Some(&"DVL-POLICY-002"));
}

#[test]
fn german_messages_by_default() {
    let registry = RuleRegistry::builtin().unwrap();
    let data = file(&["1,00;s;1200;8400;1503;\"RE1\";\"Miete\"".to_string()]);
    let result = ExecutionPipeline::new(&registry, "default")
        .unwrap()
        .run(data.as_bytes(), "a.csv");
    let finding = result.with_code("DVL-FIELD-010").next().unwrap();
    assert_eq!(
        finding.message,
        "Soll/Haben-Kennzeichen 's' ist ungültig (erlaubt: S, H)"
    );
    assert_eq!(finding.fix_candidates[0].new_value, "S");
}
