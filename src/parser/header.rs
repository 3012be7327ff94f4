//! EXTF header record (record 1).

use chrono::NaiveDate;
use serde::Serialize;

use super::accounts::ChartOfAccounts;
use super::dates::DateContext;
use super::tokenizer::Record;
use crate::core::{Diagnostic, Location, ParseError, Severity};

/// Format category of a Buchungsstapel.
pub const BOOKING_BATCH_CATEGORY: u16 = 21;

/// Accepted header versions.
pub const HEADER_VERSIONS: std::ops::RangeInclusive<u16> = 500..=999;

// Header field positions (0-based).
const IDX_KENNZEICHEN: usize = 0;
const IDX_VERSION: usize = 1;
const IDX_CATEGORY: usize = 2;
const IDX_FORMAT_NAME: usize = 3;
const IDX_FORMAT_VERSION: usize = 4;
const IDX_CREATED_AT: usize = 5;
const IDX_BERATER: usize = 10;
const IDX_MANDANT: usize = 11;
const IDX_FY_START: usize = 12;
const IDX_ACCOUNT_LENGTH: usize = 13;
const IDX_PERIOD_FROM: usize = 14;
const IDX_PERIOD_TO: usize = 15;
const IDX_BEZEICHNUNG: usize = 16;
const IDX_DIKTAT: usize = 17;
const IDX_BUCHUNGSTYP: usize = 18;
const IDX_FESTSCHREIBUNG: usize = 20;
const IDX_WKZ: usize = 21;
const IDX_SKR: usize = 26;

/// Typed view of the EXTF header.
///
/// Beraternummer and Mandantennummer are kept as strings; leading zeros
/// survive untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatevHeader {
    pub kennzeichen: String,
    pub header_version: u16,
    pub format_category: u16,
    pub format_name: String,
    pub format_version: Option<u16>,
    pub created_at: Option<String>,
    pub beraternummer: Option<String>,
    pub mandantennummer: Option<String>,
    pub fiscal_year_start: Option<NaiveDate>,
    pub account_length: Option<u8>,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub bezeichnung: Option<String>,
    pub diktatkuerzel: Option<String>,
    pub buchungstyp: Option<String>,
    pub festschreibung: Option<String>,
    pub waehrung: Option<String>,
    pub sachkontenrahmen: Option<String>,
    pub chart: Option<ChartOfAccounts>,
    /// Unescaped header values.
    pub values: Vec<String>,
    /// Verbatim header tokens for roundtrip writing.
    pub raw_tokens: Vec<String>,
    pub line_span: (usize, usize),
}

impl DatevHeader {
    /// Context for TTMM year derivation.
    pub fn date_context(&self) -> DateContext {
        DateContext {
            period_from: self.period_from,
            period_to: self.period_to,
            fiscal_year_start: self.fiscal_year_start,
        }
    }

    /// Header value by selector name, as used in rule definitions.
    pub fn field_value(&self, name: &str) -> Option<String> {
        let fmt_date = |d: &Option<NaiveDate>| d.map(|d| d.format("%Y%m%d").to_string());
        match name {
            "kennzeichen" => Some(self.kennzeichen.clone()),
            "header_version" => Some(self.header_version.to_string()),
            "format_category" => Some(self.format_category.to_string()),
            "format_name" => Some(self.format_name.clone()),
            "format_version" => self.format_version.map(|v| v.to_string()),
            "created_at" => self.created_at.clone(),
            "beraternummer" => self.beraternummer.clone(),
            "mandantennummer" => self.mandantennummer.clone(),
            "fiscal_year_start" => fmt_date(&self.fiscal_year_start),
            "account_length" => self.account_length.map(|v| v.to_string()),
            "period_from" => fmt_date(&self.period_from),
            "period_to" => fmt_date(&self.period_to),
            "bezeichnung" => self.bezeichnung.clone(),
            "diktatkuerzel" => self.diktatkuerzel.clone(),
            "buchungstyp" => self.buchungstyp.clone(),
            "festschreibung" => self.festschreibung.clone(),
            "waehrung" => self.waehrung.clone(),
            "sachkontenrahmen" => self.sachkontenrahmen.clone(),
            _ => None,
        }
    }
}

fn value(values: &[String], idx: usize) -> Option<String> {
    values
        .get(idx)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn fatal(code: &'static str, line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Header {
        code,
        line,
        message: message.into(),
    }
}

/// Parse and validate record 1.
///
/// A missing `EXTF` marker, a version outside 500-999 or a category other
/// than Buchungsstapel is fatal. Everything else is reported as a
/// diagnostic and parsing continues.
pub fn parse_header(
    record: &Record,
    file: &str,
) -> Result<(DatevHeader, Vec<Diagnostic>), ParseError> {
    let line = record.line_span.0;
    let values = &record.values;
    let loc = |field: &str, idx: usize| {
        Location::file(file)
            .with_row(1)
            .with_line(line)
            .with_column(idx + 1)
            .with_field(field)
    };
    let mut diagnostics = Vec::new();

    let kennzeichen = value(values, IDX_KENNZEICHEN).unwrap_or_default();
    if kennzeichen != "EXTF" {
        return Err(fatal(
            "DVL-HDR-001",
            line,
            format!("expected EXTF marker, found {:?}", kennzeichen),
        ));
    }
    if values.len() <= IDX_CATEGORY {
        return Err(fatal(
            "DVL-HDR-005",
            line,
            "header ends before the format category",
        ));
    }

    let version_raw = value(values, IDX_VERSION).unwrap_or_default();
    let header_version = version_raw
        .parse::<u16>()
        .ok()
        .filter(|v| HEADER_VERSIONS.contains(v))
        .ok_or_else(|| {
            fatal(
                "DVL-HDR-002",
                line,
                format!("header version {:?} outside 500-999", version_raw),
            )
        })?;

    let category_raw = value(values, IDX_CATEGORY).unwrap_or_default();
    let format_category = category_raw
        .parse::<u16>()
        .ok()
        .filter(|c| *c == BOOKING_BATCH_CATEGORY)
        .ok_or_else(|| {
            fatal(
                "DVL-HDR-003",
                line,
                format!(
                    "format category {:?} is not {} (Buchungsstapel)",
                    category_raw, BOOKING_BATCH_CATEGORY
                ),
            )
        })?;

    let format_version = match value(values, IDX_FORMAT_VERSION) {
        None => None,
        Some(raw) => match raw.parse::<u16>() {
            Ok(v) => Some(v),
            Err(_) => {
                diagnostics.push(Diagnostic::new(
                    "DVL-HDR-006",
                    Severity::Warn,
                    format!("format version {:?} is not a number", raw),
                    loc("format_version", IDX_FORMAT_VERSION),
                ));
                None
            }
        },
    };

    let mut date_field = |name: &str, idx: usize| -> Option<NaiveDate> {
        let raw = value(values, idx)?;
        match NaiveDate::parse_from_str(&raw, "%Y%m%d") {
            Ok(d) => Some(d),
            Err(_) => {
                diagnostics.push(
                    Diagnostic::new(
                        "DVL-HDR-006",
                        Severity::Warn,
                        format!("{} {:?} is not a YYYYMMDD date", name, raw),
                        loc(name, idx),
                    )
                    .with_context("value", raw),
                );
                None
            }
        }
    };
    let fiscal_year_start = date_field("fiscal_year_start", IDX_FY_START);
    let period_from = date_field("period_from", IDX_PERIOD_FROM);
    let period_to = date_field("period_to", IDX_PERIOD_TO);

    if let (Some(from), Some(to)) = (period_from, period_to) {
        if from > to {
            diagnostics.push(Diagnostic::new(
                "DVL-HDR-004",
                Severity::Error,
                format!("period start {} is after period end {}", from, to),
                loc("period_from", IDX_PERIOD_FROM),
            ));
        }
    }

    let account_length = match value(values, IDX_ACCOUNT_LENGTH) {
        None => None,
        Some(raw) => match raw.parse::<u8>() {
            Ok(len) if (4..=9).contains(&len) => Some(len),
            _ => {
                diagnostics.push(Diagnostic::new(
                    "DVL-HDR-006",
                    Severity::Warn,
                    format!("account length {:?} outside 4-9", raw),
                    loc("account_length", IDX_ACCOUNT_LENGTH),
                ));
                None
            }
        },
    };

    let sachkontenrahmen = value(values, IDX_SKR);
    let chart = sachkontenrahmen
        .as_deref()
        .and_then(ChartOfAccounts::from_code);

    let header = DatevHeader {
        kennzeichen,
        header_version,
        format_category,
        format_name: value(values, IDX_FORMAT_NAME).unwrap_or_default(),
        format_version,
        created_at: value(values, IDX_CREATED_AT),
        beraternummer: value(values, IDX_BERATER),
        mandantennummer: value(values, IDX_MANDANT),
        fiscal_year_start,
        account_length,
        period_from,
        period_to,
        bezeichnung: value(values, IDX_BEZEICHNUNG),
        diktatkuerzel: value(values, IDX_DIKTAT),
        buchungstyp: value(values, IDX_BUCHUNGSTYP),
        festschreibung: value(values, IDX_FESTSCHREIBUNG),
        waehrung: value(values, IDX_WKZ),
        sachkontenrahmen,
        chart,
        values: record.values.clone(),
        raw_tokens: record.raw_tokens.clone(),
        line_span: record.line_span,
    };
    Ok((header, diagnostics))
}
