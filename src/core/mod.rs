//! Shared value types, error enums and configuration.
//!
//! Everything the parser, the rule engine and the fix engine exchange lives
//! here, so output adapters can depend on this module alone.

mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;
