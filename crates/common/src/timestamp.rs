//! Logical time
//!
//! A single counter advanced once per dispatched instruction. It orders
//! transaction starts and bounds the snapshot seen by read-only transactions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tick of the logical clock
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The time initial values are considered committed at
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn new(tick: u64) -> Self {
        Self(tick)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic logical clock
#[derive(Debug, Default)]
pub struct LogicalClock {
    now: Timestamp,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock and return the new time
    pub fn tick(&mut self) -> Timestamp {
        self.now = Timestamp(self.now.0 + 1);
        self.now
    }

    /// Current time without advancing
    pub fn now(&self) -> Timestamp {
        self.now
    }
}
