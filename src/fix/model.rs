use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{PatchOperation, RiskLevel};

/// SHA-256 of a whole file, lowercase hex.
pub fn file_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One proposed field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub row_no: usize,
    pub field: String,
    pub operation: PatchOperation,
    pub old_value: String,
    pub new_value: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    pub rule_code: String,
    /// Registration position of the rule; `None` for codes outside the
    /// registry.
    pub rule_position: Option<usize>,
    pub description: String,
}

impl Patch {
    /// `(row_no, field)` target of the patch.
    pub fn target(&self) -> (usize, &str) {
        (self.row_no, &self.field)
    }
}

/// Several patches for one field. Only `winner` is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub row_no: usize,
    pub field: String,
    pub winner: Patch,
    pub alternatives: Vec<Patch>,
}

impl Conflict {
    /// All competing patches, winner first.
    pub fn candidates(&self) -> impl Iterator<Item = &Patch> {
        std::iter::once(&self.winner).chain(self.alternatives.iter())
    }
}

/// Ordered, conflict-free set of patches for one file.
///
/// Built by [`PatchPlanner`](super::PatchPlanner) and never changed
/// afterwards. The recorded checksum ties the plan to the exact bytes it was
/// planned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPlan {
    file: String,
    checksum: String,
    patches: Vec<Patch>,
    conflicts: Vec<Conflict>,
}

impl PatchPlan {
    pub(crate) fn new(
        file: String,
        checksum: String,
        patches: Vec<Patch>,
        conflicts: Vec<Conflict>,
    ) -> Self {
        Self {
            file,
            checksum,
            patches,
            conflicts,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Checksum of the file the plan was built from.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Winning patches, ordered by row, field and rule position.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn risk_counts(&self) -> BTreeMap<RiskLevel, usize> {
        let mut counts = BTreeMap::new();
        for patch in &self.patches {
            *counts.entry(patch.risk).or_insert(0) += 1;
        }
        counts
    }

    pub fn operation_counts(&self) -> BTreeMap<PatchOperation, usize> {
        let mut counts = BTreeMap::new();
        for patch in &self.patches {
            *counts.entry(patch.operation).or_insert(0) += 1;
        }
        counts
    }

    /// Whether any patch needs explicit approval.
    pub fn requires_approval(&self) -> bool {
        self.patches.iter().any(|p| p.requires_approval)
    }

    pub fn patches_for_row(&self, row_no: usize) -> impl Iterator<Item = &Patch> {
        self.patches.iter().filter(move |p| p.row_no == row_no)
    }
}
