use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::types::{Location, Severity};

/// Fatal parser failures. Nothing past the failing record is parsed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Neither UTF-8 nor Windows-1252 can decode the input.
    #[error("encoding undecidable: {0}")]
    EncodingUndecidable(String),

    /// The file lacks a header record or a column-label record.
    #[error("expected header and column records, found {found} record(s)")]
    InsufficientRecords { found: usize },

    /// Record 1 is not a usable EXTF Buchungsstapel header.
    #[error("{code} at line {line}: {message}")]
    Header {
        code: &'static str,
        line: usize,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Stable DVL code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EncodingUndecidable(_) => "DVL-ENC-001",
            Self::InsufficientRecords { .. } => "DVL-HDR-001",
            Self::Header { code, .. } => *code,
            Self::Io { .. } => "DVL-IO-001",
        }
    }

    /// Physical line of the offending record, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Header { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Location of the failure within `file`. I/O errors name their own path.
    pub fn location(&self, file: &str) -> Location {
        let location = match self {
            Self::Io { path, .. } => Location::file(path.display().to_string()),
            _ => Location::file(file),
        };
        match self.line() {
            Some(line) => location.with_line(line),
            None => location,
        }
    }

    /// True for failures detected while decoding or splitting records,
    /// false for header validation failures.
    pub fn is_parse_stage(&self) -> bool {
        !matches!(self, Self::Header { .. })
    }
}

/// Errors raised while loading rules or resolving profiles.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuleError {
    #[error("YAML error in {source_name}: {message}")]
    Yaml {
        source_name: String,
        message: String,
    },

    #[error("rule {0} is registered twice")]
    DuplicateRule(String),

    #[error("profile {0} is registered twice")]
    DuplicateProfile(String),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("profile inheritance cycle: {0}")]
    ProfileCycle(String),

    #[error("invalid glob pattern {pattern}: {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("rule {rule}: invalid pattern {pattern}: {message}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        message: String,
    },

    #[error("rule {rule}: invalid parameter override: {message}")]
    InvalidParams { rule: String, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the fix engine. Every variant except [`FixError::Audit`]
/// is returned before the target file is touched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FixError {
    #[error("applying fixes is not permitted")]
    NotPermitted,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    /// The file changed between planning and applying.
    #[error("file changed since the plan was built (expected {expected}, found {actual})")]
    StalePlan { expected: String, actual: String },

    #[error("row {row_no} field {field}: expected {expected:?}, found {actual:?}")]
    PatchMismatch {
        row_no: usize,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("backup failed: {0}")]
    Backup(String),

    /// The audit entry could not be written; the target was restored.
    #[error("audit log failed: {0}")]
    Audit(String),

    #[error("no audit entry for run {0}")]
    RunNotFound(String),

    #[error("run {0} has no backup to restore")]
    NoBackup(String),

    #[error("checksum mismatch on {subject}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[cfg(feature = "fix")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A non-fatal structural problem found by the parser.
///
/// Diagnostics are collected, never raised; the pipeline turns them into
/// findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    pub context: BTreeMap<String, String>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.location, self.message)
    }
}

impl Diagnostic {
    pub fn new(
        code: &'static str,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Short title for a DVL diagnostic code, or `None` for rule codes.
pub fn describe_code(code: &str) -> Option<&'static str> {
    let title = match code {
        "DVL-ENC-001" => "Encoding unknown or unreadable",
        "DVL-ENC-002" => "Invalid byte sequence for detected encoding",
        "DVL-CSV-001" => "Delimiter mismatch or malformed quotes",
        "DVL-CSV-002" => "Unexpected end of file in quoted field",
        "DVL-HDR-001" => "Missing EXTF or wrong format category",
        "DVL-HDR-002" => "Invalid header version",
        "DVL-HDR-003" => "Invalid format category (expected 21 for Buchungsstapel)",
        "DVL-HDR-004" => "Invalid period dates",
        "DVL-HDR-005" => "Missing required header field",
        "DVL-HDR-006" => "Invalid header field value",
        "DVL-COL-001" => "Missing required column",
        "DVL-COL-002" => "Duplicate column name",
        "DVL-COL-003" => "Unknown column (not in field dictionary)",
        "DVL-DATE-001" => "Invalid TTMM format",
        "DVL-DATE-002" => "TTMM date is ambiguous (could be multiple years)",
        "DVL-DATE-003" => "Date outside header period",
        "DVL-DATE-004" => "No context data for year derivation",
        "DVL-FIELD-002" => "Identifier is not a digit string",
        "DVL-FIELD-003" => "Invalid decimal format",
        "DVL-ROW-001" => "Too many rows (exceeds 99,999)",
        "DVL-IO-001" => "File could not be read",
        _ => return None,
    };
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_codes_are_stable() {
        assert_eq!(
            ParseError::EncodingUndecidable("x".into()).code(),
            "DVL-ENC-001"
        );
        let hdr = ParseError::Header {
            code: "DVL-HDR-002",
            line: 1,
            message: "version 400".into(),
        };
        assert_eq!(hdr.code(), "DVL-HDR-002");
        assert_eq!(hdr.line(), Some(1));
        assert_eq!(hdr.location("a.csv"), Location::file("a.csv").with_line(1));
        assert!(!hdr.is_parse_stage());
        assert!(ParseError::InsufficientRecords { found: 1 }.is_parse_stage());
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::new(
            "DVL-COL-002",
            Severity::Warn,
            "duplicate column Konto",
            Location::file("x.csv").with_row(2),
        );
        assert_eq!(d.to_string(), "[DVL-COL-002] x.csv:row 2: duplicate column Konto");
    }

    #[test]
    fn every_parser_code_has_a_title() {
        for code in ["DVL-ENC-001", "DVL-CSV-002", "DVL-COL-003", "DVL-DATE-004", "DVL-ROW-001"] {
            assert!(describe_code(code).is_some(), "{code}");
        }
        assert!(describe_code("DVL-FIELD-011").is_none());
    }
}
