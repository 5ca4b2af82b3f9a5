//! Transaction identifier
//!
//! Transactions are named by the integer in their textual form (`T3` -> 3).
//! Ordering on the id is only used as a deterministic tie-break; age is
//! carried separately by the transaction's start time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u32);

impl TransactionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw integer id
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Parse from string representation (`T7` or `7`)
    pub fn parse(s: &str) -> Result<Self, String> {
        let digits = s.trim().trim_start_matches(['T', 't']);
        digits
            .parse()
            .map(Self)
            .map_err(|e| format!("Invalid transaction ID '{}': {}", s, e))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl From<u32> for TransactionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
