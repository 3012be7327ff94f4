//! Column label mapping (record 2).

use std::collections::HashSet;

use serde::Serialize;

use super::field_dict::{self, FieldDef};
use super::tokenizer::Record;
use crate::core::{Diagnostic, Location, Severity};

/// One column of record 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedColumn {
    pub index: usize,
    pub label: String,
    /// Canonical id, a generated id for unknown labels, or `None` for
    /// padding and duplicate columns.
    pub field_id: Option<String>,
    /// Found in the field dictionary.
    pub known: bool,
}

/// Resolved column layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn columns(&self) -> &[MappedColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column position of a field.
    pub fn index_of(&self, field_id: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.field_id.as_deref() == Some(field_id))
            .map(|c| c.index)
    }

    /// Field id stored at a column position.
    pub fn field_at(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|c| c.field_id.as_deref())
    }

    /// Dictionary entry of the column at `index`, for known columns.
    pub fn def_at(&self, index: usize) -> Option<&'static FieldDef> {
        let col = self.columns.get(index)?;
        if !col.known {
            return None;
        }
        col.field_id.as_deref().and_then(field_dict::field)
    }

    pub fn has(&self, field_id: &str) -> bool {
        self.index_of(field_id).is_some()
    }
}

/// Resolve record 2 into a [`ColumnMapping`].
///
/// Unknown labels are errors but keep a generated id so their values stay
/// in `fields_raw`. Duplicate labels warn and the first column wins.
/// Missing required columns are errors. Empty labels are padding.
pub fn map_columns(record: &Record, file: &str) -> (ColumnMapping, Vec<Diagnostic>) {
    let line = record.line_span.0;
    let mut diagnostics = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(record.values.len());

    for (index, label) in record.values.iter().enumerate() {
        let loc = || {
            Location::file(file)
                .with_row(2)
                .with_line(line)
                .with_column(index + 1)
        };
        let trimmed = label.trim();
        if trimmed.is_empty() {
            columns.push(MappedColumn {
                index,
                label: label.clone(),
                field_id: None,
                known: false,
            });
            continue;
        }

        let (id, known) = match field_dict::lookup(trimmed) {
            Some(def) => (def.id.to_string(), true),
            None => {
                let id = field_dict::generated_id(trimmed);
                diagnostics.push(
                    Diagnostic::new(
                        "DVL-COL-003",
                        Severity::Error,
                        format!("unknown column {:?}", trimmed),
                        loc().with_field(id.clone()),
                    )
                    .with_context("label", trimmed),
                );
                (id, false)
            }
        };

        let field_id = if seen.insert(id.clone()) {
            Some(id)
        } else {
            diagnostics.push(
                Diagnostic::new(
                    "DVL-COL-002",
                    Severity::Warn,
                    format!("duplicate column {:?}; only the first is used", trimmed),
                    loc().with_field(id.clone()),
                )
                .with_context("label", trimmed),
            );
            None
        };

        columns.push(MappedColumn {
            index,
            label: label.clone(),
            field_id,
            known,
        });
    }

    for required in field_dict::required_fields() {
        if !seen.contains(required) {
            diagnostics.push(Diagnostic::new(
                "DVL-COL-001",
                Severity::Error,
                format!("required column {:?} is missing", required),
                Location::file(file)
                    .with_row(2)
                    .with_line(line)
                    .with_field(required),
            ));
        }
    }

    (ColumnMapping { columns }, diagnostics)
}
