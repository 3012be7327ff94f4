//! Constraint evaluation.

use std::collections::BTreeMap;

use regex::bytes::{Regex, RegexBuilder};
use rust_decimal::Decimal;

use super::model::{Charset, Constraint};
use crate::core::RuleError;
use crate::parser::parse_decimal;

/// A constraint ready to evaluate, with its regex compiled.
#[derive(Debug, Clone)]
pub enum Check {
    Regex { pattern: String, regex: Regex },
    MaxLength(usize),
    MinLength(usize),
    Enum(Vec<String>),
    Required,
    Range { min: Option<Decimal>, max: Option<Decimal> },
    Charset(Charset),
    /// Evaluated across rows by the duplicate detector.
    Unique {
        expected_rows: usize,
        false_positive_rate: f64,
    },
}

/// A failed check, with messages in both languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub de: String,
    pub en: String,
    /// Values available to message templates.
    pub params: BTreeMap<String, String>,
}

impl Violation {
    fn new(de: String, en: String) -> Self {
        Self {
            de,
            en,
            params: BTreeMap::new(),
        }
    }

    fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Message in `language`, English for anything but German.
    pub fn message(&self, language: &str) -> &str {
        if language == "de" { &self.de } else { &self.en }
    }
}

/// Compile a regex over bytes with Unicode classes switched off, so `\w`
/// and friends never admit accented letters.
pub fn ascii_regex(rule_id: &str, pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .unicode(false)
        .build()
        .map_err(|e| RuleError::InvalidPattern {
            rule: rule_id.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

impl Check {
    pub fn compile(rule_id: &str, constraint: &Constraint) -> Result<Self, RuleError> {
        Ok(match constraint {
            Constraint::Regex { pattern } => Self::Regex {
                pattern: pattern.clone(),
                regex: ascii_regex(rule_id, pattern)?,
            },
            Constraint::MaxLength { value } => Self::MaxLength(*value),
            Constraint::MinLength { value } => Self::MinLength(*value),
            Constraint::Enum { values } => Self::Enum(values.clone()),
            Constraint::Required => Self::Required,
            Constraint::Range { min, max } => Self::Range {
                min: *min,
                max: *max,
            },
            Constraint::Charset { charset } => Self::Charset(*charset),
            Constraint::Unique {
                expected_rows,
                false_positive_rate,
            } => Self::Unique {
                expected_rows: *expected_rows,
                false_positive_rate: *false_positive_rate,
            },
        })
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Unique { .. })
    }

    /// Upper length bound, used as the default for truncating fixes.
    pub fn max_length(&self) -> Option<usize> {
        match self {
            Self::MaxLength(n) => Some(*n),
            _ => None,
        }
    }

    /// Check one value. Only `Required` looks at missing or empty values;
    /// every other check passes them.
    pub fn evaluate(&self, value: Option<&str>) -> Option<Violation> {
        if let Self::Required = self {
            return match value {
                Some(v) if !v.trim().is_empty() => None,
                _ => Some(Violation::new(
                    "Pflichtfeld ist leer".into(),
                    "Required field is empty".into(),
                )),
            };
        }
        let value = value.filter(|v| !v.is_empty())?;

        match self {
            Self::Regex { pattern, regex } => (!regex.is_match(value.as_bytes())).then(|| {
                Violation::new(
                    format!("Wert '{}' entspricht nicht dem Muster {}", value, pattern),
                    format!("Value '{}' does not match pattern {}", value, pattern),
                )
                .param("pattern", pattern)
            }),
            Self::MaxLength(max) => {
                let len = value.chars().count();
                (len > *max).then(|| {
                    Violation::new(
                        format!("Wert ist {} Zeichen lang, erlaubt sind höchstens {}", len, max),
                        format!("Value is {} characters long, maximum is {}", len, max),
                    )
                    .param("max", max)
                    .param("len", len)
                })
            }
            Self::MinLength(min) => {
                let len = value.chars().count();
                (len < *min).then(|| {
                    Violation::new(
                        format!("Wert ist {} Zeichen lang, erforderlich sind mindestens {}", len, min),
                        format!("Value is {} characters long, minimum is {}", len, min),
                    )
                    .param("min", min)
                    .param("len", len)
                })
            }
            Self::Enum(allowed) => (!allowed.iter().any(|a| a == value)).then(|| {
                let list = allowed.join(", ");
                Violation::new(
                    format!("Wert '{}' ist nicht zulässig (erlaubt: {})", value, list),
                    format!("Value '{}' is not allowed (allowed: {})", value, list),
                )
                .param("allowed", list)
            }),
            // Unparsable amounts are reported by the parser.
            Self::Range { min, max } => {
                let amount = parse_decimal(value)?;
                let below = min.is_some_and(|m| amount < m);
                let above = max.is_some_and(|m| amount > m);
                (below || above).then(|| {
                    let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
                    let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
                    Violation::new(
                        format!("Betrag {} liegt außerhalb von [{}, {}]", value, lo, hi),
                        format!("Amount {} is outside [{}, {}]", value, lo, hi),
                    )
                    .param("min", lo)
                    .param("max", hi)
                })
            }
            Self::Charset(charset) => (!charset.accepts(value)).then(|| {
                Violation::new(
                    format!(
                        "Wert '{}' enthält Zeichen außerhalb des Zeichensatzes {}",
                        value,
                        charset.as_str()
                    ),
                    format!(
                        "Value '{}' contains characters outside charset {}",
                        value,
                        charset.as_str()
                    ),
                )
                .param("charset", charset.as_str())
            }),
            Self::Required | Self::Unique { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn check(c: Constraint) -> Check {
        Check::compile("T", &c).unwrap()
    }

    #[test]
    fn regex_is_ascii_only() {
        let c = check(Constraint::Regex {
            pattern: r"^\w+$".into(),
        });
        assert!(c.evaluate(Some("ABC_1")).is_none());
        assert!(c.evaluate(Some("Müller")).is_some());
    }

    #[test]
    fn empty_values_only_fail_required() {
        let max = check(Constraint::MaxLength { value: 2 });
        assert!(max.evaluate(None).is_none());
        assert!(max.evaluate(Some("")).is_none());
        let req = check(Constraint::Required);
        assert!(req.evaluate(None).is_some());
        assert!(req.evaluate(Some("  ")).is_some());
        assert!(req.evaluate(Some("x")).is_none());
    }

    #[test]
    fn length_counts_characters() {
        let max = check(Constraint::MaxLength { value: 3 });
        assert!(max.evaluate(Some("äöü")).is_none());
        let v = max.evaluate(Some("abcd")).unwrap();
        assert_eq!(v.params["max"], "3");
        assert_eq!(v.message("en"), "Value is 4 characters long, maximum is 3");
        assert!(check(Constraint::MinLength { value: 2 }).evaluate(Some("a")).is_some());
    }

    #[test]
    fn enum_and_range() {
        let e = check(Constraint::Enum {
            values: vec!["S".into(), "H".into()],
        });
        assert!(e.evaluate(Some("S")).is_none());
        assert!(e.evaluate(Some("s")).is_some());

        let r = check(Constraint::Range {
            min: Some(dec!(0.01)),
            max: Some(dec!(9999999999.99)),
        });
        assert!(r.evaluate(Some("100,00")).is_none());
        assert!(r.evaluate(Some("0,00")).is_some());
        assert!(r.evaluate(Some("garbage")).is_none());
    }

    #[test]
    fn invalid_regex_is_a_rule_error() {
        let err = Check::compile(
            "DVL-X",
            &Constraint::Regex {
                pattern: "([".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }
}
