//! # datev-lint
//!
//! Validation and repair of DATEV EXTF Buchungsstapel files: a streaming
//! parser, a staged rule engine with inheritable profiles, and a fix engine
//! that rewrites files atomically with backup, audit trail and rollback.
//!
//! Amounts use [`rust_decimal::Decimal`], never floating point. Account,
//! advisor and client numbers stay strings so leading zeros survive.
//!
//! ## Quick Start
//!
//! ```rust
//! use datev_lint::rules::{ExecutionPipeline, RuleRegistry};
//! use datev_lint::Severity;
//!
//! let data = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n\
//!             Umsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum;Belegfeld 1\r\n\
//!             100,00;S;01200;8400;1503;\"RE-2025-001\"\r\n\
//!             250,00;H;01200;8400;1603;\"RE-2025-001\"\r\n";
//!
//! let registry = RuleRegistry::builtin().unwrap();
//! let pipeline = ExecutionPipeline::new(&registry, "de.skr03.default").unwrap();
//! let result = pipeline.run(data.as_bytes(), "EXTF_Buchungsstapel.csv");
//!
//! let duplicate = result.with_code("DVL-CROSS-001").next().unwrap();
//! assert_eq!(duplicate.severity, Severity::Error);
//! assert_eq!(duplicate.location.row_no, Some(4));
//! assert_eq!(duplicate.related[0].row_no, Some(3));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Findings, severities, errors, configuration |
//! | `parser` (default) | Encoding detection, tokenizer, header, columns, rows, dates |
//! | `rules` (default) | YAML rules and profiles, execution pipeline, duplicates |
//! | `fix` (default) | Patch plans, risk gate, writer, backup, audit, rollback |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "parser")]
pub mod parser;

#[cfg(feature = "rules")]
pub mod rules;

#[cfg(feature = "fix")]
pub mod fix;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
