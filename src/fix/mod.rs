//! Fix engine: patch planning, risk gating, crash-safe writing, audit and
//! rollback.
//!
//! A [`PatchPlan`] is built from the fix candidates of a validation run.
//! When two rules want to change the same field, the one registered first
//! wins and the other is recorded as a [`Conflict`]. Applying a plan backs
//! the file up, renames the new content over it and writes an
//! [`AuditEntry`] that [`FixEngine::rollback`] can later undo.
//!
//! # Example
//!
//! ```
//! use datev_lint::core::{LintConfigBuilder, RiskLevel};
//! use datev_lint::fix::{DenyAll, FixEngine};
//! use datev_lint::rules::{ExecutionPipeline, RuleRegistry};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("batch.csv");
//! std::fs::write(
//!     &path,
//!     "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n\
//!      Umsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum;Buchungstext\r\n\
//!      100,00;s;1200;8400;1503;Miete\r\n",
//! )
//! .unwrap();
//!
//! let registry = RuleRegistry::builtin().unwrap();
//! let config = LintConfigBuilder::new("default")
//!     .accept_risk(RiskLevel::Low)
//!     .audit_dir(dir.path().join("audit"))
//!     .build();
//! let engine = FixEngine::new(ExecutionPipeline::from_config(&registry, &config).unwrap(), config);
//!
//! let (_, plan) = engine.plan(&path).unwrap();
//! let applied = engine.apply(&plan, &mut DenyAll).unwrap();
//! assert!(applied.unresolved.is_empty());
//! assert!(std::fs::read_to_string(&path).unwrap().contains("100,00;S;1200"));
//!
//! engine.rollback(applied.run_id.as_deref().unwrap()).unwrap();
//! assert!(std::fs::read_to_string(&path).unwrap().contains("100,00;s;1200"));
//! ```

mod audit;
mod backup;
mod engine;
mod model;
mod planner;
mod preview;
mod risk;
mod writer;

pub use audit::{AuditEntry, AuditFile, AuditLogger, AuditPatch, AuditSkip, AuditVersions, new_run_id};
pub use backup::{Backup, BackupManager};
pub use engine::{ApplyResult, FixEngine, RollbackResult, VerifyReport};
pub use model::{Conflict, Patch, PatchPlan, file_checksum};
pub use planner::PatchPlanner;
pub use risk::{ApproveAll, Approver, DenyAll, GateDecision, RiskGate, SkipReason, SkippedPatch};
pub use writer::{StagedFile, WriteOutput, Writer, stage, write_atomic};
