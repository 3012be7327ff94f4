//! Year derivation for TTMM dates.
//!
//! DATEV writes the Belegdatum as day and month only (`1503` = 15 March).
//! The year comes from the header period, or failing that from the fiscal
//! year start. Derivation is pure: identical inputs always give identical
//! output.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// How certain the derived year is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DateConfidence {
    /// Exactly one candidate year fits the header period.
    High,
    /// Taken from the fiscal year start.
    Medium,
    /// The dates built from both candidate years lie inside the period;
    /// the earlier year was chosen.
    Ambiguous,
    /// Malformed or outside the header period.
    Failed,
    /// No period or fiscal year in the header.
    Unknown,
}

/// A TTMM value with its derived year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedDate {
    pub raw: String,
    pub day: u32,
    pub month: u32,
    /// `None` exactly when confidence is `Failed` or `Unknown`.
    pub year: Option<i32>,
    pub confidence: DateConfidence,
    /// Diagnostic code describing a non-high result.
    pub warning_code: Option<&'static str>,
}

impl DerivedDate {
    /// The full calendar date, when a year was derived.
    pub fn date(&self) -> Option<NaiveDate> {
        self.year
            .and_then(|y| NaiveDate::from_ymd_opt(y, self.month, self.day))
    }

    fn failed(raw: &str, day: u32, month: u32, code: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            day,
            month,
            year: None,
            confidence: DateConfidence::Failed,
            warning_code: Some(code),
        }
    }
}

/// Header data available for year derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateContext {
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub fiscal_year_start: Option<NaiveDate>,
}

/// Split a four-digit TTMM string into day and month.
pub fn parse_ttmm(ttmm: &str) -> Option<(u32, u32)> {
    if ttmm.len() != 4 || !ttmm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = ttmm[..2].parse().ok()?;
    let month: u32 = ttmm[2..].parse().ok()?;
    ((1..=31).contains(&day) && (1..=12).contains(&month)).then_some((day, month))
}

/// Derive the year of a TTMM date.
pub fn derive(ttmm: &str, ctx: &DateContext) -> DerivedDate {
    let Some((day, month)) = parse_ttmm(ttmm) else {
        return DerivedDate::failed(ttmm, 0, 0, "DVL-DATE-001");
    };

    if let (Some(from), Some(to)) = (ctx.period_from, ctx.period_to) {
        return derive_from_period(ttmm, day, month, from, to);
    }

    if let Some(fy) = ctx.fiscal_year_start {
        let year = if month >= fy.month() {
            fy.year()
        } else {
            fy.year() + 1
        };
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return DerivedDate::failed(ttmm, day, month, "DVL-DATE-001");
        }
        return DerivedDate {
            raw: ttmm.to_string(),
            day,
            month,
            year: Some(year),
            confidence: DateConfidence::Medium,
            warning_code: None,
        };
    }

    DerivedDate {
        raw: ttmm.to_string(),
        day,
        month,
        year: None,
        confidence: DateConfidence::Unknown,
        warning_code: Some("DVL-DATE-004"),
    }
}

fn derive_from_period(
    ttmm: &str,
    day: u32,
    month: u32,
    from: NaiveDate,
    to: NaiveDate,
) -> DerivedDate {
    let mut years = vec![from.year()];
    if to.year() != from.year() {
        years.push(to.year());
    }

    let candidates: Vec<NaiveDate> = years
        .into_iter()
        .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
        .collect();
    if candidates.is_empty() {
        return DerivedDate::failed(ttmm, day, month, "DVL-DATE-001");
    }

    let matching: Vec<i32> = candidates
        .iter()
        .filter(|d| from <= **d && **d <= to)
        .map(|d| d.year())
        .collect();

    let (year, confidence, warning_code) = match matching.as_slice() {
        [] => return DerivedDate::failed(ttmm, day, month, "DVL-DATE-003"),
        [only] => (*only, DateConfidence::High, None),
        [first, ..] => (*first, DateConfidence::Ambiguous, Some("DVL-DATE-002")),
    };

    DerivedDate {
        raw: ttmm.to_string(),
        day,
        month,
        year: Some(year),
        confidence,
        warning_code,
    }
}
