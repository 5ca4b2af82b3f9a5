//! Transaction registry
//!
//! Owns every transaction record together with the lock queues, site wait
//! queues and the wait-for graph, so all bookkeeping about "who waits for
//! what" changes in one place.

use super::queues::{LockQueues, WaitQueues, Waiter};
use super::state::{Transaction, TransactionStatus};
use crate::deadlock::{Deadlock, DeadlockDetector};
use crate::error::{Error, Result};
use crate::event::Event;
use repdb_common::{SiteId, Timestamp, TransactionId, VariableId};
use repdb_site::LockMode;
use std::collections::{BTreeMap, VecDeque};

/// Registry of transactions and their waiting state
#[derive(Debug, Default)]
pub struct TransactionManager {
    transactions: BTreeMap<TransactionId, Transaction>,
    lock_queues: LockQueues,
    wait_queues: WaitQueues,
    detector: DeadlockDetector,

    /// Transactions whose suspended operation completed; their backlog is replayed next
    resumed: VecDeque<TransactionId>,

    /// Events produced by the instruction being processed
    events: Vec<Event>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // === REGISTRY ===

    pub fn begin(&mut self, txn: TransactionId, read_only: bool, start_time: Timestamp) -> Result<()> {
        if self.transactions.contains_key(&txn) {
            return Err(Error::DuplicateTransaction(txn));
        }
        self.transactions
            .insert(txn, Transaction::new(txn, read_only, start_time));
        tracing::debug!(txn = %txn, read_only, start = %start_time, "transaction started");
        Ok(())
    }

    pub fn contains(&self, txn: TransactionId) -> bool {
        self.transactions.contains_key(&txn)
    }

    pub fn get(&self, txn: TransactionId) -> Result<&Transaction> {
        self.transactions
            .get(&txn)
            .ok_or(Error::UnknownTransaction(txn))
    }

    pub fn get_mut(&mut self, txn: TransactionId) -> Result<&mut Transaction> {
        self.transactions
            .get_mut(&txn)
            .ok_or(Error::UnknownTransaction(txn))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn is_active(&self, txn: TransactionId) -> bool {
        self.transactions.get(&txn).is_some_and(Transaction::is_active)
    }

    /// Whether the transaction's current operation is parked on a queue
    pub fn is_suspended(&self, txn: TransactionId) -> bool {
        self.lock_queues.contains(txn) || self.wait_queues.contains(txn)
    }

    pub fn start_time(&self, txn: TransactionId) -> Timestamp {
        self.transactions
            .get(&txn)
            .map(Transaction::start_time)
            .unwrap_or(Timestamp::ZERO)
    }

    /// Active transactions holding at least one lock at `site`
    pub fn residents(&self, site: SiteId) -> Vec<TransactionId> {
        self.transactions
            .values()
            .filter(|t| t.is_active() && t.presence_at(site) > 0)
            .map(Transaction::id)
            .collect()
    }

    /// Finish a transaction: drop it from every queue and from the wait-for graph
    ///
    /// Returns the variables whose lock queues it left.
    pub fn terminate(&mut self, txn: TransactionId, status: TransactionStatus) -> Result<Vec<VariableId>> {
        self.get_mut(txn)?.terminate(status);
        let vacated = self.lock_queues.remove_transaction(txn);
        self.wait_queues.remove_transaction(txn);
        self.detector.remove(txn);
        Ok(vacated)
    }

    // === LOCK QUEUES ===

    pub fn enqueue_lock(&mut self, var: VariableId, txn: TransactionId, mode: LockMode) {
        tracing::debug!(txn = %txn, variable = %var, ?mode, "queued for lock");
        self.lock_queues.push(var, Waiter { txn, mode });
    }

    /// Queue a holder of `var` ahead of waiters that hold nothing on it
    pub fn enqueue_upgrade(&mut self, var: VariableId, txn: TransactionId, mode: LockMode) {
        tracing::debug!(txn = %txn, variable = %var, ?mode, "queued for lock upgrade");
        self.lock_queues.push_front(var, Waiter { txn, mode });
    }

    pub fn lock_queue_front(&self, var: VariableId) -> Option<Waiter> {
        self.lock_queues.front(var)
    }

    pub fn pop_lock_queue(&mut self, var: VariableId) -> Option<Waiter> {
        self.lock_queues.pop_front(var)
    }

    pub fn conflicting_waiters(&self, var: VariableId, txn: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        self.lock_queues.conflicting_waiters(var, txn, mode)
    }

    pub fn lock_waiters(&self, var: VariableId) -> Vec<TransactionId> {
        self.lock_queues.waiters(var)
    }

    pub fn lock_queue(&self, var: VariableId) -> Vec<Waiter> {
        self.lock_queues.entries(var)
    }

    // === WAIT QUEUES ===

    pub fn enqueue_wait(&mut self, txn: TransactionId, sites: &[SiteId]) {
        tracing::debug!(txn = %txn, sites = ?sites.iter().map(SiteId::get).collect::<Vec<_>>(), "queued for sites");
        self.wait_queues.push(txn, sites);
    }

    pub fn take_wait_queue(&mut self, site: SiteId) -> Vec<TransactionId> {
        self.wait_queues.take(site)
    }

    pub fn leave_wait_queues(&mut self, txn: TransactionId) {
        self.wait_queues.remove_transaction(txn);
    }

    pub fn site_waiters(&self, site: SiteId) -> Vec<TransactionId> {
        self.wait_queues.waiters(site)
    }

    // === WAIT-FOR GRAPH ===

    pub fn set_waiting(&mut self, txn: TransactionId, blockers: impl IntoIterator<Item = TransactionId>) {
        self.detector.set_waiting(txn, blockers);
    }

    pub fn clear_waiting(&mut self, txn: TransactionId) {
        self.detector.clear_waiting(txn);
    }

    pub fn waits_for(&self, txn: TransactionId) -> Vec<TransactionId> {
        self.detector.graph().successors(txn)
    }

    /// Check for a cycle through the edges of `txn`
    pub fn detect_deadlock(&self, txn: TransactionId) -> Option<Deadlock> {
        self.detector.detect(txn, |member| self.start_time(member))
    }

    // === RESUMPTION ===

    pub fn mark_resumed(&mut self, txn: TransactionId) {
        if !self.resumed.contains(&txn) {
            self.resumed.push_back(txn);
        }
    }

    pub fn next_resumed(&mut self) -> Option<TransactionId> {
        self.resumed.pop_front()
    }

    // === EVENTS ===

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
