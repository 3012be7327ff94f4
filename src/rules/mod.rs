//! Rule engine: YAML-defined constraints, inheritable profiles and a staged
//! execution pipeline.
//!
//! Rules run in six ordered stages (`parse`, `header`, `schema`,
//! `row_semantic`, `cross_row`, `policy`). Only a fatal finding in the first
//! two stages stops a run. Profiles select rules by glob, inherit from a
//! base profile and override severities or constraint parameters.
//!
//! # Example
//!
//! ```
//! use datev_lint::rules::{ExecutionPipeline, RuleRegistry};
//!
//! let mut registry = RuleRegistry::builtin().unwrap();
//! registry
//!     .load_yaml_str(
//!         "house.yaml",
//!         r#"
//! profiles:
//!   - id: house
//!     base: de.skr03.default
//!     rules: { disable: ["DVL-POLICY-*"] }
//! "#,
//!     )
//!     .unwrap();
//!
//! let pipeline = ExecutionPipeline::new(&registry, "house").unwrap();
//! assert!(!pipeline.profile().is_active("DVL-POLICY-002"));
//! assert_eq!(pipeline.plugins(), &["house.yaml".to_string()]);
//! ```

mod constraints;
mod duplicates;
mod fixes;
mod loader;
mod model;
mod pipeline;
mod registry;

pub use constraints::{Check, Violation, ascii_regex};
pub use duplicates::{BloomFilter, Duplicate, DuplicateDetector};
pub use fixes::{CompiledFix, DEFAULT_SANITIZE_PATTERN};
pub use loader::{
    BUILTIN_PROFILES, BUILTIN_RULES, RuleDocument, load_directory, parse_document, rule_files,
};
pub use model::{
    AppliesTo, Charset, Constraint, FixStep, FixStrategy, Profile, ProfileOverrides,
    ProfileRules, Rule, Selector,
};
pub use pipeline::{
    ExecutionPipeline, PARSER_RULE_VERSION, PipelineResult, PipelineStats, Summary,
    diagnostic_finding,
};
pub use registry::{ActiveRule, ResolvedProfile, RuleRegistry};
