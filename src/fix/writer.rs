//! Rendering patched files and committing them atomically.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::model::Patch;
use crate::core::{FixError, ParseError, WriteMode};
use crate::parser::{
    Encoding, Record, TokenizeError, Tokenizer, decode, encode, fits_cp1252, map_columns,
    needs_quotes, quote,
};

/// Rendered file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutput {
    pub bytes: Vec<u8>,
    pub encoding: Encoding,
    /// Mode actually used. Differs from the requested one after a fallback.
    pub mode: WriteMode,
    pub fallback_reason: Option<String>,
    pub patches_applied: usize,
}

/// Renders a file with patches applied.
///
/// `Preserve` splices regenerated records into the original text and leaves
/// every other byte alone. `Canonical` quotes every field, ends every record
/// with CRLF and writes Windows-1252 when possible, UTF-8 with BOM
/// otherwise; equal input always renders to equal bytes.
#[derive(Debug, Clone, Copy)]
pub struct Writer {
    mode: WriteMode,
}

type RowPatches<'a> = HashMap<usize, Vec<(usize, &'a Patch)>>;

fn render_token(raw: &str, new_value: &str) -> String {
    if raw.starts_with('"') || needs_quotes(new_value) {
        quote(new_value)
    } else {
        new_value.to_string()
    }
}

/// Values of one record with its patches applied. Fails when a patch no
/// longer matches the value it was planned against.
fn patched_values(record: &Record, row_no: usize, patches: &[(usize, &Patch)]) -> Result<Vec<String>, FixError> {
    let mut values = record.values.clone();
    for (index, patch) in patches {
        let actual = values.get(*index).map(String::as_str).unwrap_or_default();
        if actual != patch.old_value {
            return Err(FixError::PatchMismatch {
                row_no,
                field: patch.field.clone(),
                expected: patch.old_value.clone(),
                actual: actual.to_string(),
            });
        }
        if *index >= values.len() {
            // Short record: missing trailing fields read as empty.
            values.resize(*index + 1, String::new());
        }
        values[*index] = patch.new_value.clone();
    }
    Ok(values)
}

impl Writer {
    pub fn new(mode: WriteMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Render `data` with `patches` applied.
    pub fn render(&self, data: &[u8], file: &str, patches: &[Patch]) -> Result<WriteOutput, FixError> {
        let decoded = decode(data, file)?;
        let text = decoded.text;
        let records: Vec<_> = Tokenizer::new(text.clone()).collect();

        let columns = match records.get(1) {
            Some(Ok(labels)) => map_columns(labels, file).0,
            _ => {
                return Err(ParseError::InsufficientRecords {
                    found: records.len().min(1),
                }
                .into());
            }
        };
        let mut by_row: RowPatches<'_> = HashMap::new();
        for patch in patches {
            let index = columns
                .index_of(&patch.field)
                .ok_or_else(|| FixError::PatchMismatch {
                    row_no: patch.row_no,
                    field: patch.field.clone(),
                    expected: patch.old_value.clone(),
                    actual: String::new(),
                })?;
            by_row.entry(patch.row_no).or_default().push((index, patch));
        }
        for (row_no, patches) in &by_row {
            let in_range = *row_no >= 1 && *row_no <= records.len();
            if !in_range || records[row_no - 1].is_err() {
                let patch = patches[0].1;
                return Err(FixError::PatchMismatch {
                    row_no: *row_no,
                    field: patch.field.clone(),
                    expected: patch.old_value.clone(),
                    actual: String::new(),
                });
            }
        }

        if self.mode == WriteMode::Preserve {
            let rendered = render_preserve(&text, &records, &by_row)?;
            match encode(&rendered, decoded.encoding) {
                Ok(bytes) => {
                    debug!(file, patches = patches.len(), "rendered in preserve mode");
                    return Ok(WriteOutput {
                        bytes,
                        encoding: decoded.encoding,
                        mode: WriteMode::Preserve,
                        fallback_reason: None,
                        patches_applied: patches.len(),
                    });
                }
                Err(c) => {
                    let reason = format!(
                        "{:?} cannot be written as {}",
                        c,
                        decoded.encoding.as_str()
                    );
                    warn!(file, %reason, "falling back to canonical mode");
                    let mut out = render_canonical(&text, &records, &by_row)?;
                    out.fallback_reason = Some(reason);
                    out.patches_applied = patches.len();
                    return Ok(out);
                }
            }
        }

        let mut out = render_canonical(&text, &records, &by_row)?;
        out.patches_applied = patches.len();
        debug!(file, encoding = out.encoding.as_str(), "rendered in canonical mode");
        Ok(out)
    }
}

fn render_preserve(
    text: &str,
    records: &[Result<Record, TokenizeError>],
    by_row: &RowPatches<'_>,
) -> Result<String, FixError> {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for (i, item) in records.iter().enumerate() {
        let row_no = i + 1;
        let (Ok(record), Some(patches)) = (item, by_row.get(&row_no)) else {
            continue;
        };
        let values = patched_values(record, row_no, patches)?;
        let mut tokens = record.raw_tokens.clone();
        tokens.resize(values.len(), String::new());
        for (index, _) in patches {
            let raw = record.raw_tokens.get(*index).map(String::as_str).unwrap_or_default();
            tokens[*index] = render_token(raw, &values[*index]);
        }
        out.push_str(&text[copied..record.span.start]);
        out.push_str(&tokens.join(";"));
        copied = record.span.end;
    }
    out.push_str(&text[copied..]);
    Ok(out)
}

fn render_canonical(
    text: &str,
    records: &[Result<Record, TokenizeError>],
    by_row: &RowPatches<'_>,
) -> Result<WriteOutput, FixError> {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for (i, item) in records.iter().enumerate() {
        let row_no = i + 1;
        match item {
            Ok(record) => {
                let values = match by_row.get(&row_no) {
                    Some(patches) => patched_values(record, row_no, patches)?,
                    None => record.values.clone(),
                };
                let fields: Vec<String> = values.iter().map(|v| quote(v)).collect();
                out.push_str(&fields.join(";"));
            }
            // Broken records are kept verbatim.
            Err(err) => out.push_str(&text[err.span.clone()]),
        }
        out.push_str("\r\n");
    }

    let encoding = if fits_cp1252(&out) {
        Encoding::Windows1252
    } else {
        Encoding::Utf8Bom
    };
    let bytes = encode(&out, encoding)
        .map_err(|c| FixError::Encoding(format!("{:?} cannot be written as {}", c, encoding.as_str())))?;
    Ok(WriteOutput {
        bytes,
        encoding,
        mode: WriteMode::Canonical,
        fallback_reason: None,
        patches_applied: 0,
    })
}

/// New content written next to its target, not yet visible there.
///
/// Dropping a stage without committing removes the temporary file and leaves
/// the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staged content over the target.
    pub fn commit(self) -> Result<(), FixError> {
        let target = self.target;
        self.temp.persist(&target).map_err(|e| FixError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        info!(path = %target.display(), "committed");
        Ok(())
    }
}

/// Write `bytes` to a temporary file in the target's directory. The target's
/// permissions are carried over when it exists.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedFile, FixError> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |source| FixError::Io {
        path: target.to_path_buf(),
        source,
    };
    let mut temp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    temp.write_all(bytes).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    if let Ok(meta) = fs::metadata(target) {
        temp.as_file().set_permissions(meta.permissions()).map_err(io_err)?;
    }
    debug!(temp = %temp.path().display(), bytes = bytes.len(), "staged");
    Ok(StagedFile {
        temp,
        target: target.to_path_buf(),
    })
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), FixError> {
    stage(target, bytes)?.commit()
}
