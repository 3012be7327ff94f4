//! Apply, rollback and verify.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use super::audit::{AuditEntry, AuditFile, AuditLogger, AuditVersions, new_run_id};
use super::backup::BackupManager;
use super::model::{Patch, PatchPlan, file_checksum};
use super::planner::PatchPlanner;
use super::risk::{Approver, RiskGate, SkippedPatch};
use super::writer::{Writer, stage};
use crate::core::{ENGINE_VERSION, FixError, LintConfig, WriteMode};
use crate::rules::{ExecutionPipeline, PipelineResult};

/// Outcome of [`FixEngine::apply`].
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// `None` for dry runs and runs with nothing to write.
    pub run_id: Option<String>,
    pub dry_run: bool,
    pub checksum_before: String,
    pub checksum_after: String,
    pub backup_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub mode: WriteMode,
    pub fallback_reason: Option<String>,
    pub applied: Vec<Patch>,
    pub skipped: Vec<SkippedPatch>,
    /// Rendered content. Useful for dry runs.
    pub output: Vec<u8>,
    /// Validation of the rendered content.
    pub revalidation: PipelineResult,
    /// Applied patches whose finding still occurs afterwards.
    pub unresolved: Vec<Patch>,
}

impl ApplyResult {
    pub fn written(&self) -> bool {
        self.run_id.is_some()
    }
}

/// Outcome of [`FixEngine::rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackResult {
    pub run_id: String,
    pub path: PathBuf,
    pub restored_checksum: String,
}

/// State of an applied run on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub run_id: String,
    /// File still has the content the run wrote.
    pub file_matches: bool,
    /// Backup exists and holds the content from before the run.
    pub backup_matches: bool,
    pub rolled_back: bool,
}

impl VerifyReport {
    /// Whether [`FixEngine::rollback`] would go through.
    pub fn can_roll_back(&self) -> bool {
        self.file_matches && self.backup_matches && !self.rolled_back
    }
}

/// Drives planning, writing and undoing fixes for single files.
#[derive(Debug, Clone)]
pub struct FixEngine {
    pipeline: ExecutionPipeline,
    config: LintConfig,
}

fn read(path: &Path) -> Result<Vec<u8>, FixError> {
    fs::read(path).map_err(|source| FixError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl FixEngine {
    pub fn new(pipeline: ExecutionPipeline, config: LintConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn pipeline(&self) -> &ExecutionPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &LintConfig {
        &self.config
    }

    fn audit(&self) -> AuditLogger {
        AuditLogger::new(self.config.audit_dir.clone())
    }

    /// Validate `path` and plan fixes for its findings.
    pub fn plan(&self, path: impl AsRef<Path>) -> Result<(PipelineResult, PatchPlan), FixError> {
        let path = path.as_ref();
        let data = read(path)?;
        let file = path.display().to_string();
        let result = self.pipeline.run(&data, &file);
        let plan = PatchPlanner::for_profile(self.pipeline.profile()).plan(&result.findings, &file, &data);
        Ok((result, plan))
    }

    /// Apply `plan` to the file it was built for.
    ///
    /// Order of events: permission check, stale-plan check, risk gate,
    /// render, backup, atomic write, audit entry, re-validation. Any failure
    /// before the write leaves the file untouched. If the audit entry cannot
    /// be written, the file is restored from the backup.
    pub fn apply(&self, plan: &PatchPlan, approver: &mut dyn Approver) -> Result<ApplyResult, FixError> {
        if !self.config.apply_permitted {
            return Err(FixError::NotPermitted);
        }
        let path = PathBuf::from(plan.file());
        let data = read(&path)?;
        let checksum_before = file_checksum(&data);
        if checksum_before != plan.checksum() {
            return Err(FixError::StalePlan {
                expected: plan.checksum().to_string(),
                actual: checksum_before,
            });
        }

        let decision = RiskGate::new(self.config.accept_risk).evaluate(plan.patches(), approver);
        let output = Writer::new(self.config.write_mode).render(&data, plan.file(), &decision.approved)?;
        let checksum_after = file_checksum(&output.bytes);
        let revalidation = self.pipeline.run(&output.bytes, plan.file());
        let unresolved = unresolved(&decision.approved, &revalidation);

        let mut result = ApplyResult {
            run_id: None,
            dry_run: self.config.dry_run,
            checksum_before,
            checksum_after,
            backup_path: None,
            audit_path: None,
            mode: output.mode,
            fallback_reason: output.fallback_reason,
            applied: decision.approved,
            skipped: decision.skipped,
            output: output.bytes,
            revalidation,
            unresolved,
        };
        if self.config.dry_run || result.applied.is_empty() {
            info!(
                file = plan.file(),
                dry_run = result.dry_run,
                patches = result.applied.len(),
                "nothing written"
            );
            return Ok(result);
        }

        let backup = BackupManager::new(self.config.backup_dir.clone()).create(&path)?;
        if backup.checksum != result.checksum_before {
            return Err(FixError::Backup(format!(
                "{} changed while it was backed up",
                path.display()
            )));
        }
        stage(&path, &result.output)?.commit()?;

        let run_id = new_run_id();
        let entry = AuditEntry {
            run_id: run_id.clone(),
            timestamp: Utc::now(),
            versions: AuditVersions {
                engine: ENGINE_VERSION.to_string(),
                ruleset: self.pipeline.ruleset_version().to_string(),
                profile: format!(
                    "{}@{}",
                    self.pipeline.profile().id,
                    self.pipeline.profile().version
                ),
                plugins: self.pipeline.plugins().to_vec(),
            },
            file: AuditFile {
                path: plan.file().to_string(),
                checksum_before: result.checksum_before.clone(),
                checksum_after: result.checksum_after.clone(),
                backup_path: Some(backup.path.display().to_string()),
            },
            write_mode: result.mode,
            fallback_reason: result.fallback_reason.clone(),
            patches: result.applied.iter().map(Into::into).collect(),
            skipped: result.skipped.iter().map(Into::into).collect(),
            patches_applied: result.applied.len(),
            patches_skipped: result.skipped.len(),
            conflicts: plan.conflicts().len(),
            rolled_back: false,
            rolled_back_at: None,
        };
        let audit_path = match self.audit().write(&entry) {
            Ok(p) => p,
            Err(err) => {
                warn!(file = plan.file(), error = %err, "audit failed, restoring backup");
                let original = read(&backup.path)?;
                stage(&path, &original)?.commit()?;
                return Err(match err {
                    FixError::Audit(msg) => FixError::Audit(msg),
                    other => FixError::Audit(other.to_string()),
                });
            }
        };

        if !result.unresolved.is_empty() {
            warn!(
                run_id = %run_id,
                unresolved = result.unresolved.len(),
                "findings remain after applying fixes"
            );
        }
        info!(
            run_id = %run_id,
            file = plan.file(),
            applied = result.applied.len(),
            skipped = result.skipped.len(),
            "fixes applied"
        );
        result.run_id = Some(run_id);
        result.backup_path = Some(backup.path);
        result.audit_path = Some(audit_path);
        Ok(result)
    }

    /// Current on-disk state of a run.
    pub fn verify(&self, run_id: &str) -> Result<VerifyReport, FixError> {
        let entry = self.audit().read(run_id)?;
        let file_matches = fs::read(&entry.file.path)
            .map(|d| file_checksum(&d) == entry.file.checksum_after)
            .unwrap_or(false);
        let backup_matches = entry
            .file
            .backup_path
            .as_ref()
            .and_then(|p| fs::read(p).ok())
            .is_some_and(|d| file_checksum(&d) == entry.file.checksum_before);
        Ok(VerifyReport {
            run_id: run_id.to_string(),
            file_matches,
            backup_matches,
            rolled_back: entry.rolled_back,
        })
    }

    /// Restore the file from the run's backup.
    ///
    /// Refuses when the file changed since the run or the backup no longer
    /// holds the original content.
    pub fn rollback(&self, run_id: &str) -> Result<RollbackResult, FixError> {
        let audit = self.audit();
        let entry = audit.read(run_id)?;
        let backup_path = entry
            .file
            .backup_path
            .as_ref()
            .map(PathBuf::from)
            .ok_or_else(|| FixError::NoBackup(run_id.to_string()))?;
        let path = PathBuf::from(&entry.file.path);

        let current = file_checksum(&read(&path)?);
        if current != entry.file.checksum_after {
            return Err(FixError::ChecksumMismatch {
                subject: path.display().to_string(),
                expected: entry.file.checksum_after,
                actual: current,
            });
        }
        let original = read(&backup_path)?;
        let restored = file_checksum(&original);
        if restored != entry.file.checksum_before {
            return Err(FixError::ChecksumMismatch {
                subject: backup_path.display().to_string(),
                expected: entry.file.checksum_before,
                actual: restored,
            });
        }

        stage(&path, &original)?.commit()?;
        audit.mark_rolled_back(run_id)?;
        info!(run_id, path = %path.display(), "rolled back");
        Ok(RollbackResult {
            run_id: run_id.to_string(),
            path,
            restored_checksum: restored,
        })
    }
}

/// Applied patches whose `(code, row, field)` still shows up.
fn unresolved(applied: &[Patch], result: &PipelineResult) -> Vec<Patch> {
    applied
        .iter()
        .filter(|p| {
            result.findings.iter().any(|f| {
                f.code == p.rule_code
                    && f.location.row_no == Some(p.row_no)
                    && f.location.field.as_deref() == Some(p.field.as_str())
            })
        })
        .cloned()
        .collect()
}
