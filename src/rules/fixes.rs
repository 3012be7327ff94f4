//! Turning a rule's fix strategy into concrete candidates.

use regex::Regex;

use super::model::{FixStep, FixStrategy};
use crate::core::{FixCandidate, PatchOperation, RiskLevel, RuleError};
use crate::parser::{format_decimal, parse_decimal};

/// Characters outside the Belegfeld 1 set.
pub const DEFAULT_SANITIZE_PATTERN: &str = r"[^A-Z0-9_$&%*+\-/]";

#[derive(Debug, Clone)]
enum Step {
    Upper,
    NormalizeDecimal,
    Truncate(Option<usize>),
    Sanitize { regex: Regex, replacement: String },
    Set(String),
}

/// A fix strategy with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledFix {
    pub operation: PatchOperation,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    pub description: String,
    steps: Vec<Step>,
}

fn default_step(operation: PatchOperation) -> Option<FixStep> {
    Some(match operation {
        PatchOperation::Upper => FixStep::Upper,
        PatchOperation::NormalizeDecimal => FixStep::NormalizeDecimal,
        PatchOperation::Truncate => FixStep::Truncate { max_length: None },
        PatchOperation::SanitizeChars => FixStep::SanitizeChars {
            pattern: None,
            replacement: String::new(),
        },
        // A bare set_field has no value to set.
        PatchOperation::SetField => return None,
    })
}

impl CompiledFix {
    pub fn compile(rule_id: &str, strategy: &FixStrategy) -> Result<Self, RuleError> {
        let declared: Vec<FixStep> = if strategy.steps.is_empty() {
            default_step(strategy.operation).into_iter().collect()
        } else {
            strategy.steps.clone()
        };

        let mut steps = Vec::with_capacity(declared.len());
        for step in declared {
            steps.push(match step {
                FixStep::Upper => Step::Upper,
                FixStep::NormalizeDecimal => Step::NormalizeDecimal,
                FixStep::Truncate { max_length } => Step::Truncate(max_length),
                FixStep::SanitizeChars {
                    pattern,
                    replacement,
                } => {
                    let pattern = pattern.as_deref().unwrap_or(DEFAULT_SANITIZE_PATTERN);
                    let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
                        rule: rule_id.to_string(),
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    })?;
                    Step::Sanitize { regex, replacement }
                }
                FixStep::SetField { value } => Step::Set(value),
            });
        }

        Ok(Self {
            operation: strategy.operation,
            risk: strategy
                .risk
                .unwrap_or_else(|| strategy.operation.default_risk()),
            requires_approval: strategy.requires_approval,
            description: strategy
                .description
                .clone()
                .unwrap_or_else(|| strategy.operation.as_str().replace('_', " ")),
            steps,
        })
    }

    /// Run all steps over `value`. `max_length` fills in truncation steps
    /// that do not state their own limit.
    pub fn apply(&self, value: &str, max_length: Option<usize>) -> String {
        let mut current = value.to_string();
        for step in &self.steps {
            current = match step {
                Step::Upper => current.to_ascii_uppercase(),
                Step::NormalizeDecimal => match parse_decimal(&current) {
                    Some(d) => format_decimal(d),
                    None => current,
                },
                Step::Truncate(limit) => match limit.or(max_length) {
                    Some(n) => current.chars().take(n).collect(),
                    None => current,
                },
                Step::Sanitize { regex, replacement } => regex
                    .replace_all(&current, replacement.as_str())
                    .into_owned(),
                Step::Set(v) => v.clone(),
            };
        }
        current
    }

    /// Candidate for a flagged value, or `None` when the fix would not
    /// change it.
    pub fn candidate(
        &self,
        field: &str,
        old_value: &str,
        max_length: Option<usize>,
    ) -> Option<FixCandidate> {
        let new_value = self.apply(old_value, max_length);
        (new_value != old_value).then(|| FixCandidate {
            operation: self.operation,
            field: field.to_string(),
            old_value: old_value.to_string(),
            new_value,
            risk: self.risk,
            requires_approval: self.requires_approval,
            description: self.description.clone(),
        })
    }
}
