//! From findings to a conflict-free patch plan.

use std::collections::HashMap;

use tracing::{debug, info};

use super::model::{Conflict, Patch, PatchPlan, file_checksum};
use crate::core::Finding;
use crate::rules::{ResolvedProfile, RuleRegistry};

/// Builds [`PatchPlan`]s. Rule registration order decides between patches
/// that target the same field.
#[derive(Debug, Clone, Default)]
pub struct PatchPlanner {
    positions: HashMap<String, usize>,
}

impl PatchPlanner {
    /// Planner ordering rules by explicit positions.
    pub fn with_positions(positions: HashMap<String, usize>) -> Self {
        Self { positions }
    }

    pub fn for_registry(registry: &RuleRegistry) -> Self {
        Self::with_positions(
            registry
                .rules()
                .iter()
                .enumerate()
                .map(|(i, r)| (r.id.clone(), i))
                .collect(),
        )
    }

    pub fn for_profile(profile: &ResolvedProfile) -> Self {
        Self::with_positions(
            profile
                .rules()
                .iter()
                .map(|a| (a.rule.id.clone(), a.position))
                .collect(),
        )
    }

    /// One patch per finding and fix candidate. Findings without a row are
    /// skipped; header fields are not patched.
    pub fn extract(&self, findings: &[Finding]) -> Vec<Patch> {
        let mut patches = Vec::new();
        for finding in findings {
            let Some(row_no) = finding.location.row_no else {
                continue;
            };
            for candidate in &finding.fix_candidates {
                patches.push(Patch {
                    row_no,
                    field: candidate.field.clone(),
                    operation: candidate.operation,
                    old_value: candidate.old_value.clone(),
                    new_value: candidate.new_value.clone(),
                    risk: candidate.risk,
                    requires_approval: candidate.requires_approval,
                    rule_code: finding.code.clone(),
                    rule_position: self.positions.get(&finding.code).copied(),
                    description: candidate.description.clone(),
                });
            }
        }
        // Stable: equal keys keep finding order.
        patches.sort_by_key(|p| {
            (
                p.row_no,
                p.field.clone(),
                p.rule_position.unwrap_or(usize::MAX),
            )
        });
        patches
    }

    /// Keep the first patch per `(row_no, field)`; record the rest as
    /// conflicts. Expects patches in [`extract`](Self::extract) order.
    pub fn resolve(patches: Vec<Patch>) -> (Vec<Patch>, Vec<Conflict>) {
        let mut winners: Vec<Patch> = Vec::new();
        let mut losers: Vec<Vec<Patch>> = Vec::new();
        for patch in patches {
            match winners.last() {
                Some(last) if last.target() == patch.target() => {
                    if let Some(group) = losers.last_mut() {
                        group.push(patch);
                    }
                }
                _ => {
                    winners.push(patch);
                    losers.push(Vec::new());
                }
            }
        }
        let conflicts = winners
            .iter()
            .zip(losers)
            .filter(|(_, alternatives)| !alternatives.is_empty())
            .map(|(winner, alternatives)| Conflict {
                row_no: winner.row_no,
                field: winner.field.clone(),
                winner: winner.clone(),
                alternatives,
            })
            .collect();
        (winners, conflicts)
    }

    /// Plan fixes for the findings of one file. `data` are the bytes the
    /// findings were produced from.
    pub fn plan(&self, findings: &[Finding], file: &str, data: &[u8]) -> PatchPlan {
        let extracted = self.extract(findings);
        debug!(candidates = extracted.len(), "extracted patches");
        let (patches, conflicts) = Self::resolve(extracted);
        info!(
            file,
            patches = patches.len(),
            conflicts = conflicts.len(),
            "built patch plan"
        );
        PatchPlan::new(file.to_string(), file_checksum(data), patches, conflicts)
    }
}
