//! Lock table for a single site
//!
//! Provides variable-level locking with shared/exclusive modes. For every
//! variable the holder set is empty, all shared, or a single exclusive
//! holder.

use repdb_common::{TransactionId, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lock modes for variable access
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared lock for reading
    Shared,
    /// Exclusive lock for writing
    Exclusive,
}

impl LockMode {
    /// Check if two lock modes are compatible
    pub fn is_compatible_with(&self, other: LockMode) -> bool {
        matches!((*self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Information about a held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: TransactionId,
    pub mode: LockMode,
}

/// Result of checking if a lock can be acquired
#[derive(Debug, Clone, PartialEq)]
pub enum LockAttemptResult {
    /// Lock would be granted if requested
    WouldGrant,
    /// Lock conflicts with existing locks
    Conflict {
        /// Other transactions holding conflicting locks, in id order
        holders: Vec<(TransactionId, LockMode)>,
    },
}

/// Lock table keyed by variable
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: BTreeMap<VariableId, Vec<LockInfo>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a lock can be acquired without modifying state
    ///
    /// Locks held by the requester never conflict, so a sole shared holder
    /// may upgrade to exclusive.
    pub fn check(&self, tx_id: TransactionId, var: VariableId, mode: LockMode) -> LockAttemptResult {
        let Some(holders) = self.locks.get(&var) else {
            return LockAttemptResult::WouldGrant;
        };

        let mut conflicts: Vec<_> = holders
            .iter()
            .filter(|lock| lock.holder != tx_id && !lock.mode.is_compatible_with(mode))
            .map(|lock| (lock.holder, lock.mode))
            .collect();

        if conflicts.is_empty() {
            LockAttemptResult::WouldGrant
        } else {
            conflicts.sort_by_key(|(txn, _)| *txn);
            LockAttemptResult::Conflict { holders: conflicts }
        }
    }

    /// Grant a lock that was previously checked
    ///
    /// Returns true if the transaction had no lock on the variable before.
    /// An existing entry is upgraded to exclusive but never downgraded.
    pub fn grant(&mut self, tx_id: TransactionId, var: VariableId, mode: LockMode) -> bool {
        let holders = self.locks.entry(var).or_default();

        if let Some(existing) = holders.iter_mut().find(|lock| lock.holder == tx_id) {
            if mode == LockMode::Exclusive {
                existing.mode = LockMode::Exclusive;
            }
            debug_assert!(Self::is_consistent(holders));
            return false;
        }

        holders.push(LockInfo {
            holder: tx_id,
            mode,
        });
        debug_assert!(Self::is_consistent(holders));
        true
    }

    /// Release a specific lock held by a transaction, returning its mode
    pub fn release(&mut self, tx_id: TransactionId, var: VariableId) -> Option<LockMode> {
        let holders = self.locks.get_mut(&var)?;
        let position = holders.iter().position(|lock| lock.holder == tx_id)?;
        let released = holders.remove(position);

        if holders.is_empty() {
            self.locks.remove(&var);
        }

        Some(released.mode)
    }

    /// Release all locks held by a transaction, returning the variables freed
    pub fn release_all(&mut self, tx_id: TransactionId) -> Vec<VariableId> {
        let mut released = Vec::new();

        self.locks.retain(|var, holders| {
            let before = holders.len();
            holders.retain(|lock| lock.holder != tx_id);
            if holders.len() != before {
                released.push(*var);
            }
            !holders.is_empty()
        });

        released
    }

    /// Mode held by a transaction on a variable, if any
    pub fn mode_held(&self, tx_id: TransactionId, var: VariableId) -> Option<LockMode> {
        self.locks
            .get(&var)?
            .iter()
            .find(|lock| lock.holder == tx_id)
            .map(|lock| lock.mode)
    }

    /// All holders of a variable
    pub fn holders(&self, var: VariableId) -> Vec<(TransactionId, LockMode)> {
        self.locks
            .get(&var)
            .map(|holders| holders.iter().map(|lock| (lock.holder, lock.mode)).collect())
            .unwrap_or_default()
    }

    /// Every transaction holding at least one lock
    pub fn transactions(&self) -> BTreeSet<TransactionId> {
        self.locks
            .values()
            .flat_map(|holders| holders.iter().map(|lock| lock.holder))
            .collect()
    }

    /// Drop every lock
    pub fn clear(&mut self) {
        self.locks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Empty, all shared, or one exclusive holder
    pub fn is_consistent(holders: &[LockInfo]) -> bool {
        let exclusive = holders
            .iter()
            .filter(|lock| lock.mode == LockMode::Exclusive)
            .count();
        exclusive == 0 || holders.len() == 1
    }

    /// Check the holder invariant for every variable
    pub fn all_consistent(&self) -> bool {
        self.locks.values().all(|holders| Self::is_consistent(holders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u32) -> TransactionId {
        TransactionId::new(id)
    }

    fn x(index: u32) -> VariableId {
        VariableId::new(index)
    }

    #[test]
    fn test_lock_compatibility() {
        assert!(LockMode::Shared.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Exclusive));
    }

    #[test]
    fn test_basic_lock_acquisition() {
        let mut table = LockTable::new();

        assert_eq!(
            table.check(tx(1), x(2), LockMode::Exclusive),
            LockAttemptResult::WouldGrant
        );
        assert!(table.grant(tx(1), x(2), LockMode::Exclusive));

        match table.check(tx(2), x(2), LockMode::Exclusive) {
            LockAttemptResult::Conflict { holders } => {
                assert_eq!(holders, vec![(tx(1), LockMode::Exclusive)]);
            }
            _ => panic!("Expected conflict"),
        }
        assert!(matches!(
            table.check(tx(2), x(2), LockMode::Shared),
            LockAttemptResult::Conflict { .. }
        ));
    }

    #[test]
    fn test_shared_locks() {
        let mut table = LockTable::new();

        table.grant(tx(1), x(4), LockMode::Shared);
        assert_eq!(
            table.check(tx(2), x(4), LockMode::Shared),
            LockAttemptResult::WouldGrant
        );
        table.grant(tx(2), x(4), LockMode::Shared);

        match table.check(tx(3), x(4), LockMode::Exclusive) {
            LockAttemptResult::Conflict { holders } => {
                assert_eq!(
                    holders,
                    vec![(tx(1), LockMode::Shared), (tx(2), LockMode::Shared)]
                );
            }
            _ => panic!("Expected conflict"),
        }
        assert!(table.all_consistent());
    }

    #[test]
    fn test_sole_reader_upgrades() {
        let mut table = LockTable::new();
        table.grant(tx(1), x(4), LockMode::Shared);

        assert_eq!(
            table.check(tx(1), x(4), LockMode::Exclusive),
            LockAttemptResult::WouldGrant
        );
        assert!(!table.grant(tx(1), x(4), LockMode::Exclusive));
        assert_eq!(table.mode_held(tx(1), x(4)), Some(LockMode::Exclusive));
        assert_eq!(table.holders(x(4)).len(), 1);

        // A later shared request does not downgrade
        table.grant(tx(1), x(4), LockMode::Shared);
        assert_eq!(table.mode_held(tx(1), x(4)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let mut table = LockTable::new();
        table.grant(tx(1), x(6), LockMode::Shared);
        table.grant(tx(2), x(6), LockMode::Shared);

        match table.check(tx(1), x(6), LockMode::Exclusive) {
            LockAttemptResult::Conflict { holders } => {
                assert_eq!(holders, vec![(tx(2), LockMode::Shared)]);
            }
            _ => panic!("Expected conflict"),
        }
    }

    #[test]
    fn test_lock_release() {
        let mut table = LockTable::new();
        table.grant(tx(1), x(2), LockMode::Exclusive);
        table.grant(tx(1), x(3), LockMode::Shared);
        assert!(table.transactions().contains(&tx(1)));

        assert_eq!(table.release(tx(1), x(2)), Some(LockMode::Exclusive));
        assert_eq!(table.release(tx(1), x(2)), None);
        assert_eq!(table.mode_held(tx(1), x(2)), None);
        assert_eq!(table.mode_held(tx(1), x(3)), Some(LockMode::Shared));

        assert_eq!(table.release_all(tx(1)), vec![x(3)]);
        assert!(!table.transactions().contains(&tx(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_transactions_and_clear() {
        let mut table = LockTable::new();
        table.grant(tx(3), x(2), LockMode::Shared);
        table.grant(tx(1), x(2), LockMode::Shared);
        table.grant(tx(2), x(8), LockMode::Exclusive);

        let holders: Vec<_> = table.transactions().into_iter().collect();
        assert_eq!(holders, vec![tx(1), tx(2), tx(3)]);

        table.clear();
        assert!(table.transactions().is_empty());
    }
}
