//! Rule and profile definitions as written in YAML.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{PatchOperation, RiskLevel, Severity, Stage};

fn default_version() -> String {
    "1.0.0".into()
}

/// What a rule inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliesTo {
    #[default]
    Row,
    Header,
}

/// Field a rule reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    /// Canonical row field id or header field name.
    pub field: String,
}

/// Named character sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    Digits,
    Alphanumeric,
    /// `A-Z 0-9 _ $ & % * + - /`, the set DATEV allows in Belegfeld 1.
    Belegfeld1,
    /// No lowercase ASCII letters.
    Uppercase,
}

impl Charset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Digits => "digits",
            Self::Alphanumeric => "alphanumeric",
            Self::Belegfeld1 => "belegfeld1",
            Self::Uppercase => "uppercase",
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Digits => value.bytes().all(|b| b.is_ascii_digit()),
            Self::Alphanumeric => value.bytes().all(|b| b.is_ascii_alphanumeric()),
            Self::Belegfeld1 => value.bytes().all(|b| {
                b.is_ascii_uppercase() || b.is_ascii_digit() || b"_$&%*+-/".contains(&b)
            }),
            Self::Uppercase => !value.bytes().any(|b| b.is_ascii_lowercase()),
        }
    }
}

fn default_expected_rows() -> usize {
    crate::parser::MAX_DATA_ROWS
}

fn default_false_positive_rate() -> f64 {
    0.001
}

/// Closed set of constraint kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// ASCII-only byte regex; Unicode classes are disabled.
    Regex { pattern: String },
    MaxLength { value: usize },
    MinLength { value: usize },
    Enum { values: Vec<String> },
    Required,
    /// Inclusive bounds; amounts use the DATEV decimal format.
    Range {
        #[serde(default)]
        min: Option<Decimal>,
        #[serde(default)]
        max: Option<Decimal>,
    },
    Charset { charset: Charset },
    /// Value must not repeat within the file.
    Unique {
        #[serde(default = "default_expected_rows")]
        expected_rows: usize,
        #[serde(default = "default_false_positive_rate")]
        false_positive_rate: f64,
    },
}

impl Constraint {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Regex { .. } => "regex",
            Self::MaxLength { .. } => "max_length",
            Self::MinLength { .. } => "min_length",
            Self::Enum { .. } => "enum",
            Self::Required => "required",
            Self::Range { .. } => "range",
            Self::Charset { .. } => "charset",
            Self::Unique { .. } => "unique",
        }
    }
}

/// One transformation step of a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FixStep {
    Upper,
    NormalizeDecimal,
    /// Defaults to the rule's `max_length`.
    Truncate {
        #[serde(default)]
        max_length: Option<usize>,
    },
    /// `pattern` matches the characters to replace.
    SanitizeChars {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        replacement: String,
    },
    SetField { value: String },
}

/// How a rule repairs the values it flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStrategy {
    /// Operation recorded on the patch.
    pub operation: PatchOperation,
    /// Applied in order. Empty means the single step named by `operation`.
    #[serde(default)]
    pub steps: Vec<FixStep>,
    /// Defaults to the operation's own risk.
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// One constraint definition. `id` plus `version` identify its behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub title: String,
    pub stage: Stage,
    pub severity: Severity,
    #[serde(default)]
    pub applies_to: AppliesTo,
    pub selector: Selector,
    pub constraint: Constraint,
    /// Message templates by language code.
    #[serde(default)]
    pub message: BTreeMap<String, String>,
    #[serde(default)]
    pub docs_url: Option<String>,
    #[serde(default)]
    pub fix: Option<FixStrategy>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

/// Glob patterns selecting rule ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRules {
    #[serde(default)]
    pub enable: Vec<String>,
    #[serde(default)]
    pub disable: Vec<String>,
}

/// Per-rule adjustments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(default)]
    pub severity: BTreeMap<String, Severity>,
    /// Replacement constraint parameters, keyed by rule id.
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Mapping>,
    /// Rule ids switched off regardless of `enable`.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Named, inheritable rule bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub rules: ProfileRules,
    #[serde(default)]
    pub overrides: ProfileOverrides,
}
