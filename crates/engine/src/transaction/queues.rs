//! Lock queues and site wait queues
//!
//! A lock queue holds transactions blocked on a lock conflict for one
//! variable, in arrival order. A wait queue holds transactions blocked
//! because a site is down or cannot yet serve a read.

use repdb_common::{SiteId, TransactionId, VariableId};
use repdb_site::LockMode;
use std::collections::{BTreeMap, VecDeque};

/// A transaction waiting for a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub txn: TransactionId,
    pub mode: LockMode,
}

/// Per-variable FIFO queues of lock waiters
#[derive(Debug, Default)]
pub struct LockQueues {
    queues: BTreeMap<VariableId, VecDeque<Waiter>>,
}

impl LockQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, var: VariableId, waiter: Waiter) {
        self.queues.entry(var).or_default().push_back(waiter);
    }

    /// Queue ahead of every current waiter
    pub fn push_front(&mut self, var: VariableId, waiter: Waiter) {
        self.queues.entry(var).or_default().push_front(waiter);
    }

    pub fn front(&self, var: VariableId) -> Option<Waiter> {
        self.queues.get(&var).and_then(|queue| queue.front().copied())
    }

    pub fn pop_front(&mut self, var: VariableId) -> Option<Waiter> {
        let queue = self.queues.get_mut(&var)?;
        let waiter = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&var);
        }
        waiter
    }

    /// Waiters whose mode conflicts with `mode`, excluding `txn` itself
    pub fn conflicting_waiters(&self, var: VariableId, txn: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        self.queues
            .get(&var)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|waiter| waiter.txn != txn && !waiter.mode.is_compatible_with(mode))
                    .map(|waiter| waiter.txn)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a transaction from every queue, returning the variables it left
    pub fn remove_transaction(&mut self, txn: TransactionId) -> Vec<VariableId> {
        let mut vacated = Vec::new();
        self.queues.retain(|var, queue| {
            let before = queue.len();
            queue.retain(|waiter| waiter.txn != txn);
            if queue.len() != before {
                vacated.push(*var);
            }
            !queue.is_empty()
        });
        vacated
    }

    pub fn contains(&self, txn: TransactionId) -> bool {
        self.queues
            .values()
            .any(|queue| queue.iter().any(|waiter| waiter.txn == txn))
    }

    pub fn waiters(&self, var: VariableId) -> Vec<TransactionId> {
        self.entries(var).into_iter().map(|waiter| waiter.txn).collect()
    }

    pub fn entries(&self, var: VariableId) -> Vec<Waiter> {
        self.queues
            .get(&var)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Per-site FIFO queues of transactions waiting for the site
#[derive(Debug, Default)]
pub struct WaitQueues {
    queues: BTreeMap<SiteId, VecDeque<TransactionId>>,
}

impl WaitQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a transaction on each of the given sites
    pub fn push(&mut self, txn: TransactionId, sites: &[SiteId]) {
        for site in sites {
            let queue = self.queues.entry(*site).or_default();
            if !queue.contains(&txn) {
                queue.push_back(txn);
            }
        }
    }

    /// Take the whole queue of a site
    pub fn take(&mut self, site: SiteId) -> Vec<TransactionId> {
        self.queues
            .remove(&site)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn remove_transaction(&mut self, txn: TransactionId) {
        self.queues.retain(|_, queue| {
            queue.retain(|waiting| *waiting != txn);
            !queue.is_empty()
        });
    }

    pub fn contains(&self, txn: TransactionId) -> bool {
        self.queues.values().any(|queue| queue.contains(&txn))
    }

    pub fn waiters(&self, site: SiteId) -> Vec<TransactionId> {
        self.queues
            .get(&site)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u32) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn test_lock_queue_is_fifo() {
        let mut queues = LockQueues::new();
        let x2 = VariableId::new(2);
        queues.push(x2, Waiter { txn: tx(1), mode: LockMode::Exclusive });
        queues.push(x2, Waiter { txn: tx(2), mode: LockMode::Shared });

        assert_eq!(queues.front(x2).map(|w| w.txn), Some(tx(1)));
        assert_eq!(queues.pop_front(x2).map(|w| w.txn), Some(tx(1)));
        assert_eq!(queues.pop_front(x2).map(|w| w.txn), Some(tx(2)));
        assert_eq!(queues.pop_front(x2), None);
        assert!(queues.waiters(x2).is_empty());
    }

    #[test]
    fn test_push_front_jumps_the_queue() {
        let mut queues = LockQueues::new();
        let x2 = VariableId::new(2);
        queues.push(x2, Waiter { txn: tx(3), mode: LockMode::Exclusive });
        queues.push_front(x2, Waiter { txn: tx(1), mode: LockMode::Exclusive });

        assert_eq!(queues.waiters(x2), vec![tx(1), tx(3)]);
    }

    #[test]
    fn test_conflicting_waiters() {
        let mut queues = LockQueues::new();
        let x4 = VariableId::new(4);
        queues.push(x4, Waiter { txn: tx(1), mode: LockMode::Shared });
        queues.push(x4, Waiter { txn: tx(2), mode: LockMode::Exclusive });

        assert_eq!(queues.conflicting_waiters(x4, tx(3), LockMode::Shared), vec![tx(2)]);
        assert_eq!(
            queues.conflicting_waiters(x4, tx(3), LockMode::Exclusive),
            vec![tx(1), tx(2)]
        );
        assert_eq!(queues.conflicting_waiters(x4, tx(2), LockMode::Exclusive), vec![tx(1)]);
    }

    #[test]
    fn test_remove_transaction_from_lock_queues() {
        let mut queues = LockQueues::new();
        queues.push(VariableId::new(2), Waiter { txn: tx(1), mode: LockMode::Shared });
        queues.push(VariableId::new(4), Waiter { txn: tx(1), mode: LockMode::Shared });
        queues.push(VariableId::new(4), Waiter { txn: tx(2), mode: LockMode::Shared });

        assert!(queues.contains(tx(1)));
        assert_eq!(
            queues.remove_transaction(tx(1)),
            vec![VariableId::new(2), VariableId::new(4)]
        );
        assert!(!queues.contains(tx(1)));
        assert_eq!(queues.waiters(VariableId::new(4)), vec![tx(2)]);
    }

    #[test]
    fn test_wait_queues() {
        let mut queues = WaitQueues::new();
        let s1 = SiteId::new(1);
        let s2 = SiteId::new(2);

        queues.push(tx(1), &[s1, s2]);
        queues.push(tx(1), &[s1]);
        queues.push(tx(2), &[s1]);
        assert_eq!(queues.waiters(s1), vec![tx(1), tx(2)]);

        queues.remove_transaction(tx(1));
        assert!(queues.waiters(s2).is_empty());

        assert_eq!(queues.take(s1), vec![tx(2)]);
        assert!(!queues.contains(tx(2)));
    }
}
