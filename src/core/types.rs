use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of this engine, recorded on every finding and audit entry.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Finding severity, most severe first.
///
/// `Fatal` is only meaningful in the `parse` and `header` stages, where it
/// aborts the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Error,
    Warn,
    Info,
    Hint,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Hint,
    ];

    /// Lowercase label used in YAML and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Hint => "hint",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered validation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Header,
    Schema,
    RowSemantic,
    CrossRow,
    Policy,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Parse,
        Stage::Header,
        Stage::Schema,
        Stage::RowSemantic,
        Stage::CrossRow,
        Stage::Policy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Header => "header",
            Self::Schema => "schema",
            Self::RowSemantic => "row_semantic",
            Self::CrossRow => "cross_row",
            Self::Policy => "policy",
        }
    }

    /// Whether a fatal finding in this stage stops the pipeline.
    pub fn can_abort(&self) -> bool {
        matches!(self, Self::Parse | Self::Header)
    }

    /// Position in [`Stage::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk of applying a fix automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Auto-applicable.
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level patch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    /// Replace the value with a fixed string.
    SetField,
    /// Rewrite an amount as `1234,56`.
    NormalizeDecimal,
    /// Cut to a maximum number of characters.
    Truncate,
    /// Replace characters outside an allowed set.
    SanitizeChars,
    /// ASCII uppercase.
    Upper,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetField => "set_field",
            Self::NormalizeDecimal => "normalize_decimal",
            Self::Truncate => "truncate",
            Self::SanitizeChars => "sanitize_chars",
            Self::Upper => "upper",
        }
    }

    /// Risk assumed when a rule does not state one.
    pub fn default_risk(&self) -> RiskLevel {
        match self {
            Self::Upper | Self::NormalizeDecimal => RiskLevel::Low,
            Self::SetField | Self::Truncate | Self::SanitizeChars => RiskLevel::Medium,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the writer renders a patched file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Keep every untouched byte; regenerate only patched fields.
    #[default]
    Preserve,
    /// Normalized quoting, CRLF and encoding.
    Canonical,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Canonical => "canonical",
        }
    }
}

/// Where a finding or diagnostic points.
///
/// `row_no` counts logical records starting at 1 (header = 1, column
/// labels = 2, first data row = 3); `line` is the physical line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: Option<String>,
    pub row_no: Option<usize>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub field: Option<String>,
}

impl Location {
    /// Location covering a whole file.
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    pub fn with_row(mut self, row_no: usize) -> Self {
        self.row_no = Some(row_no);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file.as_deref().unwrap_or("<input>"))?;
        if let Some(row) = self.row_no {
            write!(f, ":row {}", row)?;
        } else if let Some(line) = self.line {
            write!(f, ":line {}", line)?;
        }
        if let Some(field) = &self.field {
            write!(f, " [{}]", field)?;
        }
        Ok(())
    }
}

/// A concrete change a rule proposes for the value it flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixCandidate {
    pub operation: PatchOperation,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    pub description: String,
}

/// One rule violation.
///
/// Both `rule_version` and `engine_version` are always set so an audit can
/// reproduce the behaviour that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub rule_version: String,
    pub engine_version: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub location: Location,
    pub context: BTreeMap<String, String>,
    pub fix_candidates: Vec<FixCandidate>,
    pub related: Vec<Location>,
    pub docs_url: Option<String>,
}

impl Finding {
    pub fn new(
        code: impl Into<String>,
        rule_version: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            code: code.into(),
            rule_version: rule_version.into(),
            engine_version: ENGINE_VERSION.to_string(),
            severity,
            title: title.into(),
            message: message.into(),
            location,
            context: BTreeMap::new(),
            fix_candidates: Vec::new(),
            related: Vec::new(),
            docs_url: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_fix(mut self, candidate: FixCandidate) -> Self {
        self.fix_candidates.push(candidate);
        self
    }

    pub fn with_related(mut self, location: Location) -> Self {
        self.related.push(location);
        self
    }

    pub fn with_docs_url(mut self, url: Option<String>) -> Self {
        self.docs_url = url;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.location, self.code, self.severity, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_most_severe_first() {
        assert!(Severity::Fatal < Severity::Error);
        assert!(Severity::Warn < Severity::Hint);
    }

    #[test]
    fn only_parse_and_header_abort() {
        let aborting: Vec<_> = Stage::ALL.iter().filter(|s| s.can_abort()).collect();
        assert_eq!(aborting, vec![&Stage::Parse, &Stage::Header]);
        assert_eq!(Stage::Policy.index(), 5);
    }

    #[test]
    fn finding_always_carries_engine_version() {
        let f = Finding::new(
            "DVL-TEST-001",
            "1.0.0",
            Severity::Error,
            "t",
            "m",
            Location::file("a.csv").with_row(3),
        );
        assert_eq!(f.engine_version, ENGINE_VERSION);
        assert_eq!(f.rule_version, "1.0.0");
        assert_eq!(f.to_string(), "a.csv:row 3 [DVL-TEST-001] error: m");
    }

    #[test]
    fn serde_labels() {
        assert_eq!(
            serde_json::to_string(&Stage::RowSemantic).unwrap(),
            "\"row_semantic\""
        );
        assert_eq!(
            serde_json::to_string(&PatchOperation::NormalizeDecimal).unwrap(),
            "\"normalize_decimal\""
        );
        assert_eq!(PatchOperation::Upper.default_risk(), RiskLevel::Low);
        assert_eq!(PatchOperation::Truncate.default_risk(), RiskLevel::Medium);
    }
}
