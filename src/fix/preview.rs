//! Plain-text plan preview.

use std::fmt::Write as _;

use super::model::PatchPlan;

impl PatchPlan {
    /// Line diff of every patch, followed by conflicts and totals.
    ///
    /// ```text
    /// row 3 belegfeld1 [DVL-FIELD-011] sanitize_chars (medium)
    ///   - re 2025
    ///   + RE2025
    /// ```
    pub fn preview(&self) -> String {
        let mut out = String::new();
        for p in self.patches() {
            let approval = if p.requires_approval { ", approval required" } else { "" };
            let _ = writeln!(
                out,
                "row {} {} [{}] {} ({}{})",
                p.row_no, p.field, p.rule_code, p.operation, p.risk, approval
            );
            let _ = writeln!(out, "  - {}", p.old_value);
            let _ = writeln!(out, "  + {}", p.new_value);
        }
        for c in self.conflicts() {
            let losers: Vec<&str> = c.alternatives.iter().map(|p| p.rule_code.as_str()).collect();
            let _ = writeln!(
                out,
                "conflict row {} {}: {} wins over {}",
                c.row_no,
                c.field,
                c.winner.rule_code,
                losers.join(", ")
            );
        }
        let risks: Vec<String> = self
            .risk_counts()
            .iter()
            .map(|(risk, n)| format!("{} {}", n, risk))
            .collect();
        let _ = write!(
            out,
            "{} patch(es), {} conflict(s)",
            self.len(),
            self.conflicts().len()
        );
        if !risks.is_empty() {
            let _ = write!(out, ": {}", risks.join(", "));
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{PatchOperation, RiskLevel};
    use crate::fix::{Patch, PatchPlanner};

    fn patch(code: &str, position: usize, new_value: &str) -> Patch {
        Patch {
            row_no: 3,
            field: "belegfeld1".into(),
            operation: PatchOperation::SanitizeChars,
            old_value: "re 2025".into(),
            new_value: new_value.into(),
            risk: RiskLevel::Medium,
            requires_approval: false,
            rule_code: code.into(),
            rule_position: Some(position),
            description: String::new(),
        }
    }

    #[test]
    fn preview_lists_patches_and_conflicts() {
        let (patches, conflicts) = PatchPlanner::resolve(vec![
            patch("DVL-FIELD-011", 0, "RE2025"),
            patch("DVL-FIELD-012", 1, "re 20"),
        ]);
        let plan = crate::fix::PatchPlan::new("f.csv".into(), "x".into(), patches, conflicts);
        let text = plan.preview();
        assert_eq!(
            text,
            "row 3 belegfeld1 [DVL-FIELD-011] sanitize_chars (medium)\n  - re 2025\n  + RE2025\n\
             conflict row 3 belegfeld1: DVL-FIELD-011 wins over DVL-FIELD-012\n\
             1 patch(es), 1 conflict(s): 1 medium\n"
        );
    }
}
