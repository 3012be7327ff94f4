//! SKR03 / SKR04 chart of accounts.

use serde::{Deserialize, Serialize};

/// Standard German chart of accounts, header field 26.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChartOfAccounts {
    /// Standardkontenrahmen 03 (process-oriented, most common for SMBs).
    SKR03,
    /// Standardkontenrahmen 04 (balance-sheet oriented).
    SKR04,
}

impl ChartOfAccounts {
    /// SKR identifier as written in the EXTF header.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SKR03 => "03",
            Self::SKR04 => "04",
        }
    }

    /// Parse the header code; `3` and `03` are both accepted.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "03" | "3" => Some(Self::SKR03),
            "04" | "4" => Some(Self::SKR04),
            _ => None,
        }
    }

    /// Built-in rule profile for this chart.
    pub fn profile_id(&self) -> &'static str {
        match self {
            Self::SKR03 => "de.skr03.default",
            Self::SKR04 => "de.skr04.default",
        }
    }
}
