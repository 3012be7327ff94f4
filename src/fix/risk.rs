//! Risk gating.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::Patch;
use crate::core::RiskLevel;

/// Decides on patches the gate will not apply on its own.
pub trait Approver {
    fn approve(&mut self, patch: &Patch) -> bool;
}

/// Approves nothing. The choice for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl Approver for DenyAll {
    fn approve(&mut self, _patch: &Patch) -> bool {
        false
    }
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl Approver for ApproveAll {
    fn approve(&mut self, _patch: &Patch) -> bool {
        true
    }
}

impl<F> Approver for F
where
    F: FnMut(&Patch) -> bool,
{
    fn approve(&mut self, patch: &Patch) -> bool {
        self(patch)
    }
}

/// Why a patch was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Risk above the accepted threshold and not approved.
    RiskAboveThreshold {
        risk: RiskLevel,
        threshold: RiskLevel,
    },
    /// The rule demands approval and none was given.
    ApprovalRequired,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskAboveThreshold { risk, threshold } => {
                write!(f, "risk {} above accepted {}", risk, threshold)
            }
            Self::ApprovalRequired => f.write_str("approval required"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPatch {
    pub patch: Patch,
    pub reason: SkipReason,
}

/// Result of gating a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    pub approved: Vec<Patch>,
    pub skipped: Vec<SkippedPatch>,
}

/// Applies patches up to a risk threshold and asks an [`Approver`] about
/// the rest.
#[derive(Debug, Clone, Copy)]
pub struct RiskGate {
    threshold: RiskLevel,
}

impl RiskGate {
    pub fn new(threshold: RiskLevel) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> RiskLevel {
        self.threshold
    }

    /// Whether `patch` passes without asking. Accepting `high` counts as
    /// approving patches that require it.
    pub fn auto_applies(&self, patch: &Patch) -> bool {
        patch.risk <= self.threshold
            && (!patch.requires_approval || self.threshold == RiskLevel::High)
    }

    pub fn evaluate(&self, patches: &[Patch], approver: &mut dyn Approver) -> GateDecision {
        let mut decision = GateDecision::default();
        for patch in patches {
            if self.auto_applies(patch) || approver.approve(patch) {
                decision.approved.push(patch.clone());
                continue;
            }
            let reason = if patch.requires_approval {
                SkipReason::ApprovalRequired
            } else {
                SkipReason::RiskAboveThreshold {
                    risk: patch.risk,
                    threshold: self.threshold,
                }
            };
            debug!(row = patch.row_no, field = %patch.field, %reason, "patch skipped");
            decision.skipped.push(SkippedPatch {
                patch: patch.clone(),
                reason,
            });
        }
        if !decision.skipped.is_empty() {
            warn!(
                skipped = decision.skipped.len(),
                approved = decision.approved.len(),
                "risk gate held back patches"
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PatchOperation;

    fn patch(risk: RiskLevel, requires_approval: bool) -> Patch {
        Patch {
            row_no: 3,
            field: "belegfeld1".into(),
            operation: PatchOperation::Truncate,
            old_value: "a".into(),
            new_value: "b".into(),
            risk,
            requires_approval,
            rule_code: "R".into(),
            rule_position: Some(0),
            description: String::new(),
        }
    }

    #[test]
    fn low_risk_passes_by_default() {
        let gate = RiskGate::new(RiskLevel::Low);
        let d = gate.evaluate(
            &[patch(RiskLevel::Low, false), patch(RiskLevel::Medium, false)],
            &mut DenyAll,
        );
        assert_eq!(d.approved.len(), 1);
        assert_eq!(
            d.skipped[0].reason,
            SkipReason::RiskAboveThreshold {
                risk: RiskLevel::Medium,
                threshold: RiskLevel::Low
            }
        );
    }

    #[test]
    fn approval_flag_needs_high_or_approver() {
        let p = patch(RiskLevel::Low, true);
        let medium = RiskGate::new(RiskLevel::Medium);
        let d = medium.evaluate(std::slice::from_ref(&p), &mut DenyAll);
        assert_eq!(d.skipped[0].reason, SkipReason::ApprovalRequired);
        assert_eq!(d.skipped[0].reason.to_string(), "approval required");

        let d = RiskGate::new(RiskLevel::High).evaluate(std::slice::from_ref(&p), &mut DenyAll);
        assert_eq!(d.approved.len(), 1);

        let mut asked = 0;
        let mut approver = |_: &Patch| {
            asked += 1;
            true
        };
        let d = medium.evaluate(&[p], &mut approver);
        assert_eq!(d.approved.len(), 1);
        assert_eq!(asked, 1);
    }

    #[test]
    fn approver_is_only_asked_when_needed() {
        let gate = RiskGate::new(RiskLevel::Medium);
        let mut approver = |_: &Patch| -> bool { panic!("not asked") };
        let d = gate.evaluate(&[patch(RiskLevel::Medium, false)], &mut approver);
        assert_eq!(d.approved.len(), 1);
    }
}
