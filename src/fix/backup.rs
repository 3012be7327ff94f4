//! Timestamped backups of files about to be rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use super::model::file_checksum;
use crate::core::FixError;

/// A verified copy of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    /// Checksum of the copy, equal to the original's at backup time.
    pub checksum: String,
    pub timestamp: i64,
}

/// Creates backups as `{name}.bak.{unix_ts}`, next to the file or in a
/// dedicated directory.
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    dir: Option<PathBuf>,
}

fn file_name(path: &Path) -> Result<String, FixError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| FixError::Backup(format!("{} has no file name", path.display())))
}

/// `(timestamp, counter)` of a backup file name, for sorting.
fn backup_key(name: &str, prefix: &str) -> Option<(i64, u32)> {
    let rest = name.strip_prefix(prefix)?;
    let (ts, n) = match rest.split_once('.') {
        Some((ts, n)) => (ts, n.parse().ok()?),
        None => (rest, 0),
    };
    Some((ts.parse().ok()?, n))
}

impl BackupManager {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    fn dir_for(&self, path: &Path) -> PathBuf {
        match (&self.dir, path.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Free backup path for `path` at `timestamp`. A `.N` counter is added
    /// when the plain name is taken.
    pub fn backup_path(&self, path: &Path, timestamp: i64) -> Result<PathBuf, FixError> {
        let base = format!("{}.bak.{}", file_name(path)?, timestamp);
        let dir = self.dir_for(path);
        let mut candidate = dir.join(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{}.{}", base, n));
            n += 1;
        }
        Ok(candidate)
    }

    /// Copy `path` and verify the copy against the original.
    pub fn create(&self, path: &Path) -> Result<Backup, FixError> {
        let original = fs::read(path).map_err(|e| FixError::Backup(format!("read {}: {}", path.display(), e)))?;
        let expected = file_checksum(&original);

        if let Some(dir) = &self.dir {
            fs::create_dir_all(dir)
                .map_err(|e| FixError::Backup(format!("create {}: {}", dir.display(), e)))?;
        }
        let timestamp = Utc::now().timestamp();
        let target = self.backup_path(path, timestamp)?;
        fs::copy(path, &target)
            .map_err(|e| FixError::Backup(format!("copy to {}: {}", target.display(), e)))?;

        let written = fs::read(&target)
            .map_err(|e| FixError::Backup(format!("read {}: {}", target.display(), e)))?;
        let checksum = file_checksum(&written);
        if checksum != expected {
            let _ = fs::remove_file(&target);
            return Err(FixError::Backup(format!(
                "{} does not match the original",
                target.display()
            )));
        }
        info!(backup = %target.display(), "backup created");
        Ok(Backup {
            path: target,
            checksum,
            timestamp,
        })
    }

    /// Backups of `path`, oldest first.
    pub fn list_backups(&self, path: &Path) -> Result<Vec<PathBuf>, FixError> {
        let prefix = format!("{}.bak.", file_name(path)?);
        let dir = self.dir_for(path);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(FixError::Io { path: dir, source }),
        };
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| FixError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(key) = backup_key(&name, &prefix) {
                found.push((key, entry.path()));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, p)| p).collect())
    }

    /// Delete all but the newest `keep` backups. Returns how many were
    /// removed.
    pub fn cleanup_old_backups(&self, path: &Path, keep: usize) -> Result<usize, FixError> {
        let backups = self.list_backups(path)?;
        let excess = backups.len().saturating_sub(keep);
        for old in &backups[..excess] {
            fs::remove_file(old).map_err(|source| FixError::Io {
                path: old.clone(),
                source,
            })?;
            debug!(backup = %old.display(), "removed old backup");
        }
        Ok(excess)
    }
}
