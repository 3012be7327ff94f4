#![cfg(feature = "parser")]

use chrono::NaiveDate;
use datev_lint::parser::*;
use datev_lint::{ParseError, Severity};
use rust_decimal_macros::dec;

const HEAD: &str =
    "\"EXTF\";700;21;\"Buchungsstapel\";13;20250110120000000;;;;;1001;1;20250101;4;20250101;20251231;\"Januar\";\"AB\";1;0;0;\"EUR\";;;;;\"03\"\r\n";
const LABELS: &str =
    "Umsatz (ohne Soll/Haben-Kz);Soll/Haben-Kennzeichen;WKZ Umsatz;Konto;Gegenkonto (ohne BU-Schlüssel);BU-Schlüssel;Belegdatum;Belegfeld 1;Buchungstext\r\n";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn file(rows: &[&str]) -> String {
    let mut s = format!("{}{}", HEAD, LABELS);
    for r in rows {
        s.push_str(r);
        s.push_str("\r\n");
    }
    s
}

// ---------------------------------------------------------------------------
// Header and columns
// ---------------------------------------------------------------------------

#[test]
fn header_fields_are_typed() {
    let parsed = parse_bytes(file(&[]).as_bytes(), "a.csv").unwrap();
    let h = &parsed.head.header;
    assert_eq!(h.header_version, 700);
    assert_eq!(h.format_category, BOOKING_BATCH_CATEGORY);
    assert_eq!(h.format_name, "Buchungsstapel");
    assert_eq!(h.beraternummer.as_deref(), Some("1001"));
    assert_eq!(h.mandantennummer.as_deref(), Some("1"));
    assert_eq!(h.fiscal_year_start, Some(date(2025, 1, 1)));
    assert_eq!(h.account_length, Some(4));
    assert_eq!(h.period_from, Some(date(2025, 1, 1)));
    assert_eq!(h.period_to, Some(date(2025, 12, 31)));
    assert_eq!(h.waehrung.as_deref(), Some("EUR"));
    assert_eq!(h.chart, Some(ChartOfAccounts::SKR03));
    assert_eq!(parsed.head.format, Format::Datev);
    assert!(parsed.head.header_diagnostics.is_empty());
}

#[test]
fn labels_map_to_canonical_fields() {
    let parsed = parse_bytes(file(&[]).as_bytes(), "a.csv").unwrap();
    let cols = &parsed.head.columns;
    assert_eq!(cols.len(), 9);
    assert_eq!(cols.index_of("umsatz"), Some(0));
    assert_eq!(cols.index_of("gegenkonto"), Some(4));
    assert_eq!(cols.index_of("belegfeld1"), Some(7));
    assert!(parsed.head.column_diagnostics.is_empty());
}

#[test]
fn synonyms_and_case_are_accepted() {
    let data = format!("{}betrag;S/H;KONTO;Gegenkonto;datum\r\n", HEAD);
    let parsed = parse_bytes(data.as_bytes(), "a.csv").unwrap();
    let cols = &parsed.head.columns;
    assert_eq!(cols.field_at(0), Some("umsatz"));
    assert_eq!(cols.field_at(1), Some("soll_haben"));
    assert_eq!(cols.field_at(4), Some("belegdatum"));
    assert!(parsed.head.column_diagnostics.is_empty());
}

#[test]
fn missing_required_columns_are_reported_once_each() {
    let data = format!("{}Umsatz;Konto\r\n", HEAD);
    let parsed = parse_bytes(data.as_bytes(), "a.csv").unwrap();
    let missing: Vec<_> = parsed
        .head
        .column_diagnostics
        .iter()
        .filter(|d| d.code == "DVL-COL-001")
        .map(|d| d.location.field.clone().unwrap())
        .collect();
    assert_eq!(missing, vec!["soll_haben", "gegenkonto", "belegdatum"]);
}

#[test]
fn header_only_file_is_fatal() {
    let err = parse_bytes(HEAD.as_bytes(), "a.csv").unwrap_err();
    assert!(matches!(err, ParseError::InsufficientRecords { found: 1 }));
}

#[test]
fn non_extf_file_is_fatal() {
    let err = parse_bytes(b"Umsatz;Konto\r\n1,00;1200\r\n", "a.csv").unwrap_err();
    assert_eq!(err.code(), "DVL-HDR-001");
    assert_eq!(detect_format("Umsatz;Konto"), Format::Unknown);
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[test]
fn rows_keep_raw_and_typed_values() {
    let data = file(&["1234,56;S;EUR;01200;8400;9;1503;\"RE-1\";\"Miete; März\""]);
    let (rows, diags) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    assert!(diags.is_empty());
    let row = &rows[0];
    assert_eq!(row.row_no, 3);
    assert_eq!(row.line_span, (3, 3));
    assert_eq!(row.umsatz(), Some(dec!(1234.56)));
    assert_eq!(row.raw("konto"), Some("01200"));
    assert_eq!(
        row.typed("konto"),
        Some(&TypedValue::Identifier("01200".into()))
    );
    assert_eq!(row.raw("buchungstext"), Some("Miete; März"));
    assert_eq!(row.raw_tokens[8], "\"Miete; März\"");
    assert_eq!(row.belegdatum().unwrap().date(), Some(date(2025, 3, 15)));
    assert!(row.diagnostics.is_empty());
}

#[test]
fn invalid_values_become_diagnostics_not_errors() {
    let data = file(&["abc;S;EUR;12A0;8400;;3102;RE1;x"]);
    let (rows, _) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    let row = &rows[0];
    let codes: Vec<&str> = row.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec!["DVL-FIELD-003", "DVL-FIELD-002", "DVL-DATE-001"]);
    assert!(row.typed("umsatz").is_none());
    assert_eq!(row.raw("umsatz"), Some("abc"));
    assert_eq!(row.diagnostics[0].location.column, Some(1));
}

#[test]
fn invalid_debit_credit_flag_is_untyped_without_diagnostic() {
    let data = file(&["1,00;X;EUR;1200;8400;;1503;RE1;x"]);
    let (rows, _) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    assert!(rows[0].typed("soll_haben").is_none());
    assert!(rows[0].diagnostics.is_empty());
}

#[test]
fn embedded_line_break_spans_two_lines() {
    let data = file(&["1,00;S;EUR;1200;8400;;1503;RE1;\"Zeile 1\r\nZeile 2\"", "2,00;H;EUR;1200;8400;;1603;RE2;y"]);
    let (rows, _) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].line_span, (3, 4));
    assert_eq!(rows[0].raw("buchungstext"), Some("Zeile 1\r\nZeile 2"));
    assert_eq!(rows[1].row_no, 4);
    assert_eq!(rows[1].line_span, (5, 5));
}

#[test]
fn row_checksum_depends_on_raw_tokens() {
    let data = file(&["1,00;S;EUR;1200;8400;;1503;RE1;x", "1,00;S;EUR;1200;8400;;1503;\"RE1\";x"]);
    let (rows, _) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    assert_eq!(rows[0].checksum.len(), 16);
    assert_eq!(rows[0].fields_raw(), rows[1].fields_raw());
    assert_ne!(rows[0].checksum, rows[1].checksum);
}

#[test]
fn row_stream_is_lazy() {
    let data = file(&["1,00;S;EUR;1200;8400;;1503;RE1;x", "2,00;S;EUR;1200;8400;;1503;RE2;x"]);
    let mut parsed = parse_bytes(data.as_bytes(), "a.csv").unwrap();
    assert_eq!(parsed.rows.rows_read(), 0);
    assert!(parsed.rows.next().unwrap().is_ok());
    assert_eq!(parsed.rows.rows_read(), 1);
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

#[test]
fn date_derivation_examples() {
    let ctx = |from, to| DateContext {
        period_from: Some(from),
        period_to: Some(to),
        fiscal_year_start: None,
    };

    let d = derive("1503", &ctx(date(2025, 1, 1), date(2025, 12, 31)));
    assert_eq!((d.date(), d.confidence), (Some(date(2025, 3, 15)), DateConfidence::High));

    // Only 2025-01-01 lies inside a December/January period.
    let d = derive("0101", &ctx(date(2024, 12, 1), date(2025, 1, 31)));
    assert_eq!((d.year, d.confidence), (Some(2025), DateConfidence::High));

    let d = derive("1504", &ctx(date(2024, 3, 1), date(2025, 4, 30)));
    assert_eq!((d.year, d.confidence), (Some(2024), DateConfidence::Ambiguous));
    assert_eq!(d.warning_code, Some("DVL-DATE-002"));

    let d = derive("1507", &ctx(date(2025, 1, 1), date(2025, 3, 31)));
    assert_eq!((d.year, d.confidence), (None, DateConfidence::Failed));
    assert_eq!(d.warning_code, Some("DVL-DATE-003"));
}

#[test]
fn periods_longer_than_a_year_keep_only_dates_inside() {
    let ctx = |from, to| DateContext {
        period_from: Some(from),
        period_to: Some(to),
        fiscal_year_start: None,
    };

    // 2025-05-15 is after the period ends.
    let d = derive("1505", &ctx(date(2024, 3, 1), date(2025, 4, 30)));
    assert_eq!((d.year, d.confidence), (Some(2024), DateConfidence::High));

    // 2023-03-15 is before the period starts.
    let d = derive("1503", &ctx(date(2023, 6, 1), date(2025, 6, 30)));
    assert_eq!((d.year, d.confidence), (Some(2025), DateConfidence::High));
}

#[test]
fn fiscal_year_and_unknown_fallbacks() {
    let fy = DateContext {
        period_from: None,
        period_to: None,
        fiscal_year_start: Some(date(2024, 7, 1)),
    };
    assert_eq!(derive("1508", &fy).year, Some(2024));
    assert_eq!(derive("1503", &fy).year, Some(2025));
    assert_eq!(derive("1503", &fy).confidence, DateConfidence::Medium);

    let none = derive("1503", &DateContext::default());
    assert_eq!(none.confidence, DateConfidence::Unknown);
    assert_eq!(none.year, None);
}

#[test]
fn leap_day_only_in_leap_year() {
    let ctx = DateContext {
        period_from: Some(date(2024, 1, 1)),
        period_to: Some(date(2024, 12, 31)),
        fiscal_year_start: None,
    };
    assert_eq!(derive("2902", &ctx).date(), Some(date(2024, 2, 29)));
    let ctx = DateContext {
        period_from: Some(date(2025, 1, 1)),
        period_to: Some(date(2025, 12, 31)),
        fiscal_year_start: None,
    };
    assert_eq!(derive("2902", &ctx).confidence, DateConfidence::Failed);
}

// ---------------------------------------------------------------------------
// Decimals and quoting
// ---------------------------------------------------------------------------

#[test]
fn german_decimals() {
    assert_eq!(parse_decimal("1234,56"), Some(dec!(1234.56)));
    assert_eq!(parse_decimal("0,5"), Some(dec!(0.5)));
    assert_eq!(parse_decimal("1.234,56"), Some(dec!(1234.56)));
    assert_eq!(parse_decimal("abc"), None);
    assert_eq!(format_decimal(dec!(1234.5)), "1234,50");
}

#[test]
fn quoting_doubles_quotes() {
    assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    assert!(needs_quotes("a;b"));
    assert!(!needs_quotes("RE-2025"));
}

#[test]
fn parse_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("EXTF_Buchungsstapel.csv");
    std::fs::write(&path, file(&["1,00;S;EUR;1200;8400;;1503;RE1;x"])).unwrap();
    let parsed = parse_file(&path).unwrap();
    assert_eq!(parsed.head.file, path.display().to_string());
    assert_eq!(parsed.rows.count(), 1);

    let err = parse_file(dir.path().join("missing.csv")).unwrap_err();
    assert!(matches!(err, ParseError::Io { .. }));
}

#[test]
fn unknown_date_context_is_info() {
    let data = "\"EXTF\";700;21;\"Buchungsstapel\";13\r\nUmsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum\r\n1,00;S;1200;8400;1503\r\n";
    let (rows, _) = parse_bytes(data.as_bytes(), "a.csv").unwrap().rows.materialize();
    let d = &rows[0].diagnostics[0];
    assert_eq!(d.code, "DVL-DATE-004");
    assert_eq!(d.severity, Severity::Info);
}
