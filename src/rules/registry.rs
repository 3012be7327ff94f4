//! Rule registry and profile resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use super::constraints::Check;
use super::fixes::CompiledFix;
use super::loader::{self, BUILTIN_PROFILES, BUILTIN_RULES, RuleDocument};
use super::model::{Profile, Rule};
use crate::core::{RuleError, Severity};

const BUILTIN_SOURCE: &str = "builtin";

/// All known rules and profiles.
///
/// Rules keep the order in which they were registered: built-in rules in
/// file order first, then plugin documents in load order. That order is
/// the tie-break when two fixes target the same field, so it is part of
/// the registry's contract.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    positions: HashMap<String, usize>,
    profiles: BTreeMap<String, Profile>,
    ruleset_version: Option<String>,
    plugins: Vec<String>,
}

/// A rule switched on by a profile, with overrides applied.
#[derive(Debug, Clone)]
pub struct ActiveRule {
    pub rule: Rule,
    /// Registration position in the registry.
    pub position: usize,
    pub check: Check,
    pub fix: Option<CompiledFix>,
}

/// A profile with its inheritance chain flattened.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub id: String,
    pub version: String,
    /// Base-most profile first.
    pub chain: Vec<String>,
    rules: Vec<ActiveRule>,
}

impl ResolvedProfile {
    /// Active rules in registration order.
    pub fn rules(&self) -> &[ActiveRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&ActiveRule> {
        self.rules.iter().find(|r| r.rule.id == id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.rule(id).is_some()
    }
}

#[derive(Debug, Default)]
struct MergedProfile {
    enable: Vec<String>,
    disable: Vec<String>,
    severity: BTreeMap<String, Severity>,
    params: BTreeMap<String, Mapping>,
    disabled: BTreeSet<String>,
    chain: Vec<String>,
}

fn compile_globset(patterns: &[String]) -> Result<GlobSet, RuleError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| RuleError::InvalidGlob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| RuleError::InvalidGlob {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

/// Replace keys of a rule's constraint parameters.
fn apply_params(rule: &mut Rule, params: &Mapping) -> Result<(), RuleError> {
    let invalid = |message: String| RuleError::InvalidParams {
        rule: rule.id.clone(),
        message,
    };
    let mut value = serde_yaml::to_value(&rule.constraint).map_err(|e| invalid(e.to_string()))?;
    let Value::Mapping(map) = &mut value else {
        return Err(invalid("constraint is not a mapping".into()));
    };
    for (key, v) in params {
        map.insert(key.clone(), v.clone());
    }
    let constraint = serde_yaml::from_value(value).map_err(|e| invalid(e.to_string()))?;
    rule.constraint = constraint;
    Ok(())
}

impl RuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules and profiles.
    pub fn builtin() -> Result<Self, RuleError> {
        let mut registry = Self::new();
        registry.add_document(
            BUILTIN_SOURCE,
            loader::parse_document(BUILTIN_SOURCE, BUILTIN_RULES)?,
        )?;
        registry.add_document(
            BUILTIN_SOURCE,
            loader::parse_document(BUILTIN_SOURCE, BUILTIN_PROFILES)?,
        )?;
        debug!(
            rules = registry.rules.len(),
            profiles = registry.profiles.len(),
            "loaded built-in rules"
        );
        Ok(registry)
    }

    /// Register a parsed document. Non-builtin sources are recorded as
    /// plugins for the audit trail.
    pub fn add_document(&mut self, source: &str, doc: RuleDocument) -> Result<(), RuleError> {
        if source == BUILTIN_SOURCE {
            if doc.version.is_some() {
                self.ruleset_version = doc.version.clone();
            }
        } else {
            self.plugins.push(match &doc.version {
                Some(v) => format!("{}@{}", source, v),
                None => source.to_string(),
            });
        }
        for rule in doc.rules {
            self.register_rule(rule)?;
        }
        for profile in doc.profiles {
            self.register_profile(profile)?;
        }
        Ok(())
    }

    /// Parse and register a YAML document.
    pub fn load_yaml_str(&mut self, source: &str, yaml: &str) -> Result<(), RuleError> {
        let doc = loader::parse_document(source, yaml)?;
        self.add_document(source, doc)
    }

    /// Register every rule file in `dir`, in file-name order.
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, RuleError> {
        let docs = loader::load_directory(dir.as_ref())?;
        let count = docs.len();
        for (source, doc) in docs {
            self.add_document(&source, doc)?;
        }
        info!(dir = %dir.as_ref().display(), files = count, "loaded rule directory");
        Ok(count)
    }

    pub fn register_rule(&mut self, rule: Rule) -> Result<(), RuleError> {
        if self.positions.contains_key(&rule.id) {
            return Err(RuleError::DuplicateRule(rule.id));
        }
        self.positions.insert(rule.id.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn register_profile(&mut self, profile: Profile) -> Result<(), RuleError> {
        if self.profiles.contains_key(&profile.id) {
            return Err(RuleError::DuplicateProfile(profile.id));
        }
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Rules in registration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.position(id).map(|i| &self.rules[i])
    }

    /// Registration position of a rule.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn profile_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Version of the built-in ruleset.
    pub fn ruleset_version(&self) -> &str {
        self.ruleset_version.as_deref().unwrap_or("unversioned")
    }

    /// Plugin sources, as `source` or `source@version`.
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    fn merge(&self, id: &str, visiting: &mut Vec<String>) -> Result<MergedProfile, RuleError> {
        if visiting.iter().any(|v| v == id) {
            visiting.push(id.to_string());
            return Err(RuleError::ProfileCycle(visiting.join(" -> ")));
        }
        let profile = self
            .profiles
            .get(id)
            .ok_or_else(|| RuleError::UnknownProfile(id.to_string()))?;

        visiting.push(id.to_string());
        let mut merged = match &profile.base {
            Some(base) => self.merge(base, visiting)?,
            None => MergedProfile::default(),
        };
        visiting.pop();

        merged.enable.extend(profile.rules.enable.iter().cloned());
        merged.disable.extend(profile.rules.disable.iter().cloned());
        for (rule, severity) in &profile.overrides.severity {
            merged.severity.insert(rule.clone(), *severity);
        }
        for (rule, params) in &profile.overrides.params {
            let entry = merged.params.entry(rule.clone()).or_default();
            for (key, value) in params {
                entry.insert(key.clone(), value.clone());
            }
        }
        merged.disabled.extend(profile.overrides.disabled.iter().cloned());
        merged.chain.push(id.to_string());
        Ok(merged)
    }

    /// Resolve a profile: base profiles first, then enable/disable globs,
    /// then severity and parameter overrides. Deprecated rules never run.
    pub fn resolve_profile(&self, id: &str) -> Result<ResolvedProfile, RuleError> {
        let merged = self.merge(id, &mut Vec::new())?;
        let enable = compile_globset(&merged.enable)?;
        let disable = compile_globset(&merged.disable)?;

        let mut rules = Vec::new();
        for (position, rule) in self.rules.iter().enumerate() {
            if rule.deprecated
                || !enable.is_match(&rule.id)
                || disable.is_match(&rule.id)
                || merged.disabled.contains(&rule.id)
            {
                continue;
            }
            let mut rule = rule.clone();
            if let Some(severity) = merged.severity.get(&rule.id) {
                rule.severity = *severity;
            }
            if let Some(params) = merged.params.get(&rule.id) {
                apply_params(&mut rule, params)?;
            }
            let check = Check::compile(&rule.id, &rule.constraint)?;
            let fix = rule
                .fix
                .as_ref()
                .map(|f| CompiledFix::compile(&rule.id, f))
                .transpose()?;
            rules.push(ActiveRule {
                rule,
                position,
                check,
                fix,
            });
        }

        let profile = self
            .profiles
            .get(id)
            .ok_or_else(|| RuleError::UnknownProfile(id.to_string()))?;
        debug!(profile = id, active = rules.len(), chain = ?merged.chain, "resolved profile");
        Ok(ResolvedProfile {
            id: id.to_string(),
            version: profile.version.clone(),
            chain: merged.chain,
            rules,
        })
    }
}
