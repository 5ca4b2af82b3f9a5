//! A single copy of a variable with its committed history

use repdb_common::{Timestamp, Value, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One site's copy of a variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    id: VariableId,

    /// Latest committed value
    value: Value,

    /// Committed versions keyed by commit time; append-only
    history: BTreeMap<Timestamp, Value>,

    /// False for a replicated copy between site recovery and its next commit
    ok_to_read: bool,

    /// Whether any transaction has committed this copy
    committed: bool,
}

impl Variable {
    /// Create a copy holding the initial value, committed at time zero
    pub fn new(id: VariableId) -> Self {
        let value = id.initial_value();
        Self {
            id,
            value,
            history: BTreeMap::from([(Timestamp::ZERO, value)]),
            ok_to_read: true,
            committed: false,
        }
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn is_readable(&self) -> bool {
        self.ok_to_read
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Latest version committed strictly before `before`
    pub fn version_before(&self, before: Timestamp) -> Option<(Timestamp, Value)> {
        self.history
            .range(..before)
            .next_back()
            .map(|(time, value)| (*time, *value))
    }

    /// Commit a new version. Returns true if this made the copy readable again.
    ///
    /// A second commit at the same time replaces the first.
    pub fn commit(&mut self, value: Value, at: Timestamp) -> bool {
        debug_assert!(
            self.history
                .last_key_value()
                .is_none_or(|(last, _)| *last <= at),
            "commit times must not go backwards"
        );
        self.history.insert(at, value);
        self.value = value;
        self.committed = true;

        let became_readable = !self.ok_to_read;
        self.ok_to_read = true;
        became_readable
    }

    /// Block ordinary reads until the next commit
    pub fn mark_unreadable(&mut self) {
        self.ok_to_read = false;
    }

    /// Number of committed versions including the initial one
    pub fn version_count(&self) -> usize {
        self.history.len()
    }
}
