//! YAML rule documents.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::model::{Profile, Rule};
use crate::core::RuleError;

/// Rules shipped with the engine.
pub const BUILTIN_RULES: &str = include_str!("builtin/rules.yaml");
/// Profiles shipped with the engine.
pub const BUILTIN_PROFILES: &str = include_str!("builtin/profiles.yaml");

/// One YAML file: an optional ruleset version, rules in registration
/// order, and profiles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Parse one document.
pub fn parse_document(source_name: &str, yaml: &str) -> Result<RuleDocument, RuleError> {
    serde_yaml::from_str(yaml).map_err(|e| RuleError::Yaml {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

/// `*.yaml` and `*.yml` files of a directory, sorted by file name so the
/// registration order is reproducible.
pub fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, RuleError> {
    let io_err = |source| RuleError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    debug!(dir = %dir.display(), files = files.len(), "found rule files");
    Ok(files)
}

/// Read and parse every rule file of a directory.
pub fn load_directory(dir: &Path) -> Result<Vec<(String, RuleDocument)>, RuleError> {
    rule_files(dir)?
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path).map_err(|source| RuleError::Io {
                path: path.clone(),
                source,
            })?;
            let name = path.display().to_string();
            let doc = parse_document(&name, &text)?;
            Ok((name, doc))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_documents_parse() {
        let rules = parse_document("builtin", BUILTIN_RULES).unwrap();
        assert!(rules.version.is_some());
        assert!(rules.rules.len() >= 15);
        let profiles = parse_document("builtin", BUILTIN_PROFILES).unwrap();
        assert!(profiles.profiles.iter().any(|p| p.id == "default"));
    }

    #[test]
    fn syntax_errors_name_the_source() {
        let err = parse_document("plugin.yaml", "rules: [").unwrap_err();
        assert!(err.to_string().contains("plugin.yaml"));
    }

    #[test]
    fn directory_is_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "rules: []").unwrap();
        std::fs::write(dir.path().join("a.yml"), "rules: []").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let docs = load_directory(dir.path()).unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|(n, _)| Path::new(n).file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }
}
