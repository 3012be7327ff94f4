//! Persistent record of fix runs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::model::Patch;
use super::risk::SkippedPatch;
use super::writer::write_atomic;
use crate::core::{FixError, PatchOperation, WriteMode};

/// Fresh, globally unique run id.
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVersions {
    pub engine: String,
    pub ruleset: String,
    pub profile: String,
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFile {
    pub path: String,
    pub checksum_before: String,
    pub checksum_after: String,
    pub backup_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPatch {
    pub row_no: usize,
    pub field: String,
    pub operation: PatchOperation,
    pub old_value: String,
    pub new_value: String,
    pub rule_code: String,
}

impl From<&Patch> for AuditPatch {
    fn from(p: &Patch) -> Self {
        Self {
            row_no: p.row_no,
            field: p.field.clone(),
            operation: p.operation,
            old_value: p.old_value.clone(),
            new_value: p.new_value.clone(),
            rule_code: p.rule_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSkip {
    pub row_no: usize,
    pub field: String,
    pub rule_code: String,
    pub reason: String,
}

impl From<&SkippedPatch> for AuditSkip {
    fn from(s: &SkippedPatch) -> Self {
        Self {
            row_no: s.patch.row_no,
            field: s.patch.field.clone(),
            rule_code: s.patch.rule_code.clone(),
            reason: s.reason.to_string(),
        }
    }
}

/// One fix run, written before the run counts as successful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub versions: AuditVersions,
    pub file: AuditFile,
    pub write_mode: WriteMode,
    #[serde(default)]
    pub fallback_reason: Option<String>,
    pub patches: Vec<AuditPatch>,
    #[serde(default)]
    pub skipped: Vec<AuditSkip>,
    pub patches_applied: usize,
    pub patches_skipped: usize,
    pub conflicts: usize,
    #[serde(default)]
    pub rolled_back: bool,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
}

/// Reads and writes audit entries, one JSON file per run.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    dir: PathBuf,
}

impl AuditLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Persist `entry` atomically.
    pub fn write(&self, entry: &AuditEntry) -> Result<PathBuf, FixError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| FixError::Audit(format!("create {}: {}", self.dir.display(), e)))?;
        let json = serde_json::to_vec_pretty(entry)?;
        let path = self.path_for(&entry.run_id);
        write_atomic(&path, &json).map_err(|e| FixError::Audit(e.to_string()))?;
        info!(run_id = %entry.run_id, path = %path.display(), "audit entry written");
        Ok(path)
    }

    pub fn read(&self, run_id: &str) -> Result<AuditEntry, FixError> {
        let path = self.path_for(run_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FixError::RunNotFound(run_id.to_string()));
            }
            Err(source) => return Err(FixError::Io { path, source }),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// All entries, oldest first, optionally only those for `file`.
    pub fn list(&self, file: Option<&str>) -> Result<Vec<AuditEntry>, FixError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(FixError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| FixError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let entry = self.read(run_id)?;
            if file.is_none_or(|f| entry.file.path == f) {
                found.push(entry);
            }
        }
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.run_id.cmp(&b.run_id)));
        debug!(count = found.len(), "listed audit entries");
        Ok(found)
    }

    /// Flag a run as rolled back.
    pub fn mark_rolled_back(&self, run_id: &str) -> Result<AuditEntry, FixError> {
        let mut entry = self.read(run_id)?;
        entry.rolled_back = true;
        entry.rolled_back_at = Some(Utc::now());
        self.write(&entry)?;
        Ok(entry)
    }
}
