//! Booking rows (records 3 and later).

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::columns::ColumnMapping;
use super::dates::{self, DateConfidence, DateContext, DerivedDate};
use super::field_dict::FieldKind;
use super::tokenizer::Record;
use crate::core::{Diagnostic, Location, Severity};

/// A value derived from a raw field. Never used for writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypedValue {
    Decimal(Decimal),
    /// Digit string; leading zeros are kept.
    Identifier(String),
    Date(DerivedDate),
    FullDate(NaiveDate),
    Enum(String),
    Text(String),
}

/// One data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRow {
    /// Logical record number (the first data row is 3).
    pub row_no: usize,
    pub line_span: (usize, usize),
    /// Verbatim source tokens.
    pub raw_tokens: Vec<String>,
    /// First 16 hex digits of SHA-256 over the raw record.
    pub checksum: String,
    fields_raw: BTreeMap<String, String>,
    fields_typed: BTreeMap<String, TypedValue>,
    /// Conversion problems found while typing this row.
    pub diagnostics: Vec<Diagnostic>,
}

impl BookingRow {
    /// Original value of a field, exactly as in the file.
    pub fn raw(&self, field: &str) -> Option<&str> {
        self.fields_raw.get(field).map(String::as_str)
    }

    pub fn fields_raw(&self) -> &BTreeMap<String, String> {
        &self.fields_raw
    }

    /// Derived value of a field. `None` when the field is empty, missing
    /// or failed conversion.
    pub fn typed(&self, field: &str) -> Option<&TypedValue> {
        self.fields_typed.get(field)
    }

    pub fn fields_typed(&self) -> &BTreeMap<String, TypedValue> {
        &self.fields_typed
    }

    pub fn umsatz(&self) -> Option<Decimal> {
        match self.typed("umsatz") {
            Some(TypedValue::Decimal(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn belegdatum(&self) -> Option<&DerivedDate> {
        match self.typed("belegdatum") {
            Some(TypedValue::Date(d)) => Some(d),
            _ => None,
        }
    }
}

/// Parse a DATEV amount. A comma is the decimal separator; when present,
/// dots are thousands separators.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(',') {
        Decimal::from_str(&trimmed.replace('.', "").replace(',', ".")).ok()
    } else {
        Decimal::from_str(trimmed).ok()
    }
}

/// Render an amount the way DATEV expects it: two decimals, comma separator.
pub fn format_decimal(d: Decimal) -> String {
    format!("{:.2}", d.round_dp(2)).replace('.', ",")
}

/// Row checksum over the raw tokens.
pub fn row_checksum(raw_tokens: &[String]) -> String {
    let digest = Sha256::digest(raw_tokens.join(";").as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Turns records into [`BookingRow`]s for one column layout.
#[derive(Debug, Clone)]
pub struct RowConverter {
    mapping: ColumnMapping,
    dates: DateContext,
    file: String,
}

impl RowConverter {
    pub fn new(mapping: ColumnMapping, dates: DateContext, file: impl Into<String>) -> Self {
        Self {
            mapping,
            dates,
            file: file.into(),
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Convert one record. Never fails; problems land in
    /// [`BookingRow::diagnostics`].
    pub fn convert(&self, record: Record, row_no: usize) -> BookingRow {
        let mut fields_raw = BTreeMap::new();
        let mut fields_typed = BTreeMap::new();
        let mut diagnostics = Vec::new();

        for (index, value) in record.values.into_iter().enumerate() {
            let Some(field_id) = self.mapping.field_at(index) else {
                continue;
            };
            if let Some(def) = self.mapping.def_at(index) {
                if !value.is_empty() {
                    let loc = Location::file(&self.file)
                        .with_row(row_no)
                        .with_line(record.line_span.0)
                        .with_column(index + 1)
                        .with_field(field_id);
                    if let Some(typed) = self.type_value(&value, def.kind, loc, &mut diagnostics) {
                        fields_typed.insert(field_id.to_string(), typed);
                    }
                }
            }
            fields_raw.insert(field_id.to_string(), value);
        }

        BookingRow {
            row_no,
            line_span: record.line_span,
            checksum: row_checksum(&record.raw_tokens),
            raw_tokens: record.raw_tokens,
            fields_raw,
            fields_typed,
            diagnostics,
        }
    }

    fn type_value(
        &self,
        value: &str,
        kind: FieldKind,
        loc: Location,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<TypedValue> {
        match kind {
            FieldKind::Decimal => match parse_decimal(value) {
                Some(d) => Some(TypedValue::Decimal(d)),
                None => {
                    diagnostics.push(
                        Diagnostic::new(
                            "DVL-FIELD-003",
                            Severity::Error,
                            format!("{:?} is not a decimal amount", value),
                            loc,
                        )
                        .with_context("value", value),
                    );
                    None
                }
            },
            FieldKind::Identifier => {
                if value.bytes().all(|b| b.is_ascii_digit()) {
                    Some(TypedValue::Identifier(value.to_string()))
                } else {
                    diagnostics.push(
                        Diagnostic::new(
                            "DVL-FIELD-002",
                            Severity::Error,
                            format!("{:?} must contain digits only", value),
                            loc,
                        )
                        .with_context("value", value),
                    );
                    None
                }
            }
            FieldKind::Ttmm => {
                let derived = dates::derive(value, &self.dates);
                if let Some(code) = derived.warning_code {
                    let (severity, message) = match derived.confidence {
                        DateConfidence::Ambiguous => (
                            Severity::Warn,
                            format!("{:?} fits both years of the period; using {}", value, derived.year.unwrap_or_default()),
                        ),
                        DateConfidence::Unknown => (
                            Severity::Info,
                            format!("no header period or fiscal year to derive the year of {:?}", value),
                        ),
                        _ if code == "DVL-DATE-001" => {
                            (Severity::Error, format!("{:?} is not a valid TTMM date", value))
                        }
                        _ => (
                            Severity::Error,
                            format!("{:?} lies outside the header period", value),
                        ),
                    };
                    diagnostics.push(
                        Diagnostic::new(code, severity, message, loc).with_context("value", value),
                    );
                }
                match derived.confidence {
                    DateConfidence::Failed if derived.day == 0 => None,
                    _ => Some(TypedValue::Date(derived)),
                }
            }
            FieldKind::FullDate => match NaiveDate::parse_from_str(value, "%d%m%Y") {
                Ok(d) => Some(TypedValue::FullDate(d)),
                Err(_) => {
                    diagnostics.push(
                        Diagnostic::new(
                            "DVL-DATE-001",
                            Severity::Error,
                            format!("{:?} is not a valid TTMMJJJJ date", value),
                            loc,
                        )
                        .with_context("value", value),
                    );
                    None
                }
            },
            // Invalid codes are left to the rule engine.
            FieldKind::Enum(allowed) => allowed
                .iter()
                .any(|a| *a == value)
                .then(|| TypedValue::Enum(value.to_string())),
            FieldKind::Text => Some(TypedValue::Text(value.to_string())),
        }
    }
}
