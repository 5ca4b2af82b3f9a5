//! Variable identifier

use crate::placement::Placement;
use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variable identifier (`x5` -> 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(u32);

impl VariableId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    /// Even-indexed variables live on every site
    pub fn is_replicated(&self) -> bool {
        self.0 % 2 == 0
    }

    /// Value every copy starts with before its first commit
    pub fn initial_value(&self) -> Value {
        10 * Value::from(self.0)
    }

    /// Where copies of this variable live in a cluster of `site_count` sites
    pub fn placement(&self, site_count: u32) -> Placement {
        Placement::of(*self, site_count)
    }

    /// Parse from string representation (`x3` or `3`)
    pub fn parse(s: &str) -> Result<Self, String> {
        let digits = s.trim().trim_start_matches(['x', 'X']);
        digits
            .parse()
            .map(Self)
            .map_err(|e| format!("Invalid variable '{}': {}", s, e))
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
