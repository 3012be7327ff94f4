use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::types::{RiskLevel, WriteMode};

/// Settings a driver passes to the validation and fix engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    /// Profile to resolve from the rule registry.
    pub profile_id: String,
    /// Message language (`de` or `en`).
    pub language: String,
    /// Highest risk applied without asking.
    pub accept_risk: RiskLevel,
    pub write_mode: WriteMode,
    /// Render and checksum, but never touch the disk.
    pub dry_run: bool,
    /// Backups go next to the file when unset.
    pub backup_dir: Option<PathBuf>,
    pub audit_dir: PathBuf,
    /// Decision of the license gate. The engine refuses to write when false.
    pub apply_permitted: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            profile_id: "default".into(),
            language: "de".into(),
            accept_risk: RiskLevel::Low,
            write_mode: WriteMode::Preserve,
            dry_run: false,
            backup_dir: None,
            audit_dir: PathBuf::from("audit"),
            apply_permitted: true,
        }
    }
}

/// Builder for [`LintConfig`].
///
/// # Example
///
/// ```
/// use datev_lint::core::{LintConfigBuilder, RiskLevel, WriteMode};
///
/// let config = LintConfigBuilder::new("de.skr03.default")
///     .accept_risk(RiskLevel::Medium)
///     .write_mode(WriteMode::Canonical)
///     .audit_dir("/tmp/datev-audit")
///     .build();
/// assert_eq!(config.language, "de");
/// ```
pub struct LintConfigBuilder {
    config: LintConfig,
}

impl LintConfigBuilder {
    /// Create a builder for the given profile.
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            config: LintConfig {
                profile_id: profile_id.into(),
                ..Default::default()
            },
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn accept_risk(mut self, risk: RiskLevel) -> Self {
        self.config.accept_risk = risk;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backup_dir = Some(dir.into());
        self
    }

    pub fn audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.audit_dir = dir.into();
        self
    }

    /// Record the license gate's decision.
    pub fn apply_permitted(mut self, permitted: bool) -> Self {
        self.config.apply_permitted = permitted;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LintConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = LintConfig::default();
        assert_eq!(c.profile_id, "default");
        assert_eq!(c.accept_risk, RiskLevel::Low);
        assert_eq!(c.write_mode, WriteMode::Preserve);
        assert!(c.apply_permitted);
        assert!(!c.dry_run);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c: LintConfig =
            serde_json::from_str(r#"{"profile_id":"de.skr04.default","accept_risk":"medium"}"#)
                .unwrap();
        assert_eq!(c.profile_id, "de.skr04.default");
        assert_eq!(c.accept_risk, RiskLevel::Medium);
        assert_eq!(c.audit_dir, PathBuf::from("audit"));
    }
}
