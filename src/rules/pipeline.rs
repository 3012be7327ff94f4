//! Staged rule execution.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::constraints::{Check, Violation};
use super::duplicates::DuplicateDetector;
use super::model::AppliesTo;
use super::registry::{ActiveRule, ResolvedProfile, RuleRegistry};
use crate::core::{
    Diagnostic, ENGINE_VERSION, Finding, LintConfig, Location, ParseError, RuleError, Severity,
    Stage, describe_code,
};
use crate::parser::{BookingRow, FileHead, parse_bytes, required_fields};

/// Version reported for findings raised by the parser itself.
pub const PARSER_RULE_VERSION: &str = "1.0.0";

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub rows_checked: usize,
    pub rules_run: usize,
    pub duration_ms: u64,
}

/// Everything one validation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Findings in stage order; within a stage, by row and then by rule.
    pub findings: Vec<Finding>,
    /// Stage that emitted a fatal finding, if the run stopped early.
    pub aborted_at: Option<Stage>,
    pub engine_version: String,
    pub ruleset_version: String,
    pub profile_id: String,
    pub profile_version: String,
    pub plugins: Vec<String>,
    pub stats: PipelineStats,
}

/// Aggregated counts, as consumed by reports and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Ten most frequent codes, most frequent first.
    pub top_codes: Vec<(String, usize)>,
}

impl PipelineResult {
    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// True when any finding is an error or worse.
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity <= Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.code == code)
    }

    pub fn summary(&self) -> Summary {
        let mut by_severity = BTreeMap::new();
        let mut codes: BTreeMap<&str, usize> = BTreeMap::new();
        for finding in &self.findings {
            *by_severity.entry(finding.severity).or_insert(0) += 1;
            *codes.entry(finding.code.as_str()).or_insert(0) += 1;
        }
        let mut top_codes: Vec<(String, usize)> =
            codes.into_iter().map(|(c, n)| (c.to_string(), n)).collect();
        top_codes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_codes.truncate(10);
        Summary {
            total: self.findings.len(),
            by_severity,
            top_codes,
        }
    }
}

/// Findings per stage, merged in stage order at the end of a run.
#[derive(Debug, Default)]
struct Buckets([Vec<Finding>; 6]);

impl Buckets {
    fn push(&mut self, stage: Stage, finding: Finding) {
        self.0[stage.index()].push(finding);
    }

    fn extend(&mut self, stage: Stage, diagnostics: &[Diagnostic]) {
        for d in diagnostics {
            self.push(stage, diagnostic_finding(d));
        }
    }

    fn has_fatal(&self, stage: Stage) -> bool {
        self.0[stage.index()].iter().any(Finding::is_fatal)
    }

    fn into_findings(self) -> Vec<Finding> {
        self.0.into_iter().flatten().collect()
    }
}

/// Finding for a parser diagnostic.
pub fn diagnostic_finding(d: &Diagnostic) -> Finding {
    let mut finding = Finding::new(
        d.code,
        PARSER_RULE_VERSION,
        d.severity,
        describe_code(d.code).unwrap_or(d.code),
        d.message.clone(),
        d.location.clone(),
    );
    finding.context = d.context.clone();
    finding
}

fn fatal_finding(err: &ParseError, file: &str) -> (Stage, Finding) {
    let stage = if err.is_parse_stage() {
        Stage::Parse
    } else {
        Stage::Header
    };
    let location = err.location(file);
    let finding = Finding::new(
        err.code(),
        PARSER_RULE_VERSION,
        Severity::Fatal,
        describe_code(err.code()).unwrap_or(err.code()),
        err.to_string(),
        location,
    );
    (stage, finding)
}

fn substitute(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Runs the active rules of one profile over files.
///
/// The pipeline owns a resolved copy of its profile, so several pipelines
/// with different profiles can share one registry.
///
/// # Example
///
/// ```
/// use datev_lint::rules::{ExecutionPipeline, RuleRegistry};
///
/// let registry = RuleRegistry::builtin().unwrap();
/// let pipeline = ExecutionPipeline::new(&registry, "de.skr03.default")
///     .unwrap()
///     .with_language("en");
///
/// let data = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n\
///             Umsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum;WKZ Umsatz\r\n\
///             100,00;s;1200;8400;1503;EUR\r\n";
/// let result = pipeline.run(data.as_bytes(), "batch.csv");
/// let flag = result.with_code("DVL-FIELD-010").next().unwrap();
/// assert_eq!(flag.fix_candidates[0].new_value, "S");
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionPipeline {
    profile: ResolvedProfile,
    ruleset_version: String,
    plugins: Vec<String>,
    language: String,
}

impl ExecutionPipeline {
    pub fn new(registry: &RuleRegistry, profile_id: &str) -> Result<Self, RuleError> {
        Ok(Self {
            profile: registry.resolve_profile(profile_id)?,
            ruleset_version: registry.ruleset_version().to_string(),
            plugins: registry.plugins().to_vec(),
            language: "de".into(),
        })
    }

    pub fn from_config(registry: &RuleRegistry, config: &LintConfig) -> Result<Self, RuleError> {
        Ok(Self::new(registry, &config.profile_id)?.with_language(config.language.clone()))
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    fn message(&self, active: &ActiveRule, violation: &Violation, value: &str) -> String {
        let template = active
            .rule
            .message
            .get(&self.language)
            .or_else(|| active.rule.message.get("en"));
        match template {
            Some(t) => {
                let mut params = violation.params.clone();
                params.insert("value".into(), value.to_string());
                substitute(t, &params)
            }
            None => violation.message(&self.language).to_string(),
        }
    }

    fn rule_finding(
        &self,
        active: &ActiveRule,
        violation: &Violation,
        value: Option<&str>,
        location: Location,
    ) -> Finding {
        let value = value.unwrap_or_default();
        let rule = &active.rule;
        let title = if rule.title.is_empty() {
            rule.id.clone()
        } else {
            rule.title.clone()
        };
        let mut finding = Finding::new(
            rule.id.clone(),
            rule.version.clone(),
            rule.severity,
            title,
            self.message(active, violation, value),
            location,
        )
        .with_docs_url(rule.docs_url.clone())
        .with_context("value", value);
        for (key, v) in &violation.params {
            finding = finding.with_context(key.clone(), v.clone());
        }
        finding
    }

    /// Attach a fix candidate when the rule has one and its result passes
    /// the rule's own check.
    fn with_fix(&self, mut finding: Finding, active: &ActiveRule, value: Option<&str>) -> Finding {
        let (Some(fix), Some(value)) = (&active.fix, value) else {
            return finding;
        };
        let field = &active.rule.selector.field;
        if let Some(candidate) = fix.candidate(field, value, active.check.max_length()) {
            if active.check.evaluate(Some(&candidate.new_value)).is_none() {
                finding = finding.with_fix(candidate);
            }
        }
        finding
    }

    fn check_header(&self, head: &FileHead, buckets: &mut Buckets) {
        for active in self.header_rules() {
            let field = &active.rule.selector.field;
            let value = head.header.field_value(field);
            let Some(violation) = active.check.evaluate(value.as_deref()) else {
                continue;
            };
            let location = Location::file(&head.file)
                .with_line(head.header.line_span.0)
                .with_field(field.clone());
            let finding = self.rule_finding(active, &violation, value.as_deref(), location);
            buckets.push(active.rule.stage, finding);
        }
    }

    fn header_rules(&self) -> impl Iterator<Item = &ActiveRule> {
        self.profile
            .rules()
            .iter()
            .filter(|a| a.rule.applies_to == AppliesTo::Header)
    }

    fn row_rules(&self, head: &FileHead) -> Vec<&ActiveRule> {
        self.profile
            .rules()
            .iter()
            .filter(|a| a.rule.applies_to == AppliesTo::Row && !a.check.is_unique())
            // A missing required column is reported once by the column mapper.
            .filter(|a| {
                let field = a.rule.selector.field.as_str();
                !matches!(a.check, Check::Required)
                    || head.columns.has(field)
                    || !required_fields().any(|f| f == field)
            })
            .collect()
    }

    fn check_row(&self, row: &BookingRow, head: &FileHead, rules: &[&ActiveRule], buckets: &mut Buckets) {
        buckets.extend(Stage::Schema, &row.diagnostics);
        for active in rules {
            let field = &active.rule.selector.field;
            let value = row.raw(field);
            let Some(violation) = active.check.evaluate(value) else {
                continue;
            };
            let mut location = Location::file(&head.file)
                .with_row(row.row_no)
                .with_line(row.line_span.0)
                .with_field(field.clone());
            if let Some(index) = head.columns.index_of(field) {
                location = location.with_column(index + 1);
            }
            let finding = self.rule_finding(active, &violation, value, location);
            buckets.push(active.rule.stage, self.with_fix(finding, active, value));
        }
    }

    fn finish(&self, buckets: Buckets, aborted_at: Option<Stage>, stats: PipelineStats) -> PipelineResult {
        PipelineResult {
            findings: buckets.into_findings(),
            aborted_at,
            engine_version: ENGINE_VERSION.to_string(),
            ruleset_version: self.ruleset_version.clone(),
            profile_id: self.profile.id.clone(),
            profile_version: self.profile.version.clone(),
            plugins: self.plugins.clone(),
            stats,
        }
    }

    /// Validate an in-memory file.
    ///
    /// Only fatal findings in the parse or header stage stop the run; every
    /// later stage runs to completion.
    pub fn run(&self, data: &[u8], file: &str) -> PipelineResult {
        let started = Instant::now();
        let mut buckets = Buckets::default();
        let mut stats = PipelineStats {
            rules_run: self.profile.rules().len(),
            ..PipelineStats::default()
        };
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let parsed = match parse_bytes(data, file) {
            Ok(parsed) => parsed,
            Err(err) => {
                let (stage, finding) = fatal_finding(&err, file);
                warn!(file, code = err.code(), stage = stage.as_str(), "pipeline aborted");
                buckets.push(stage, finding);
                stats.duration_ms = elapsed(started);
                return self.finish(buckets, Some(stage), stats);
            }
        };
        let head = parsed.head;

        buckets.extend(Stage::Parse, &head.parse_diagnostics);
        buckets.extend(Stage::Header, &head.header_diagnostics);
        self.check_header(&head, &mut buckets);
        for stage in [Stage::Parse, Stage::Header] {
            if buckets.has_fatal(stage) {
                warn!(file, stage = stage.as_str(), "pipeline aborted");
                stats.duration_ms = elapsed(started);
                return self.finish(buckets, Some(stage), stats);
            }
        }
        buckets.extend(Stage::Schema, &head.column_diagnostics);

        let rules = self.row_rules(&head);
        let mut detector = DuplicateDetector::new();
        let mut unique_rules = Vec::new();
        for active in self.profile.rules() {
            if let Check::Unique {
                expected_rows,
                false_positive_rate,
            } = active.check
            {
                detector.watch(&active.rule.selector.field, expected_rows, false_positive_rate);
                unique_rules.push(active);
            }
        }

        for item in parsed.rows {
            match item {
                Ok(row) => {
                    stats.rows_checked += 1;
                    self.check_row(&row, &head, &rules, &mut buckets);
                    detector.observe(&row);
                }
                Err(diag) => buckets.push(Stage::Parse, diagnostic_finding(&diag)),
            }
        }
        debug!(rows = stats.rows_checked, "row stages complete");

        if detector.needs_exact_pass() {
            debug!(candidates = detector.candidate_count(), "exact duplicate pass");
            match parse_bytes(data, file) {
                Ok(again) => {
                    for dup in detector.resolve(again.rows.flatten()) {
                        let active = unique_rules[dup.watch];
                        let mut params = BTreeMap::new();
                        params.insert("first_row".to_string(), dup.first_row.to_string());
                        let violation = Violation {
                            de: format!(
                                "Wert '{}' kommt bereits in Zeile {} vor",
                                dup.value, dup.first_row
                            ),
                            en: format!(
                                "Value '{}' already appears in row {}",
                                dup.value, dup.first_row
                            ),
                            params,
                        };
                        let mut location = Location::file(file)
                            .with_row(dup.row_no)
                            .with_line(dup.line)
                            .with_field(dup.field.clone());
                        if let Some(index) = head.columns.index_of(&dup.field) {
                            location = location.with_column(index + 1);
                        }
                        let related = Location::file(file)
                            .with_row(dup.first_row)
                            .with_line(dup.first_line)
                            .with_field(dup.field.clone());
                        let finding = self
                            .rule_finding(active, &violation, Some(&dup.value), location)
                            .with_related(related);
                        buckets.push(active.rule.stage, finding);
                    }
                }
                // The bytes parsed a moment ago; a second failure means
                // nothing new can be said about them.
                Err(err) => warn!(file, error = %err, "second parse for duplicates failed"),
            }
        }

        stats.duration_ms = elapsed(started);
        let result = self.finish(buckets, None, stats);
        info!(
            file,
            profile = %result.profile_id,
            findings = result.findings.len(),
            rows = result.stats.rows_checked,
            "validation complete"
        );
        result
    }

    /// Validate a file on disk. Unreadable files yield a fatal parse finding.
    pub fn run_file(&self, path: impl AsRef<Path>) -> PipelineResult {
        let path = path.as_ref();
        let file = path.display().to_string();
        match std::fs::read(path) {
            Ok(data) => self.run(&data, &file),
            Err(source) => {
                let err = ParseError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                let (stage, finding) = fatal_finding(&err, &file);
                let mut buckets = Buckets::default();
                buckets.push(stage, finding);
                self.finish(buckets, Some(stage), PipelineStats::default())
            }
        }
    }
}
