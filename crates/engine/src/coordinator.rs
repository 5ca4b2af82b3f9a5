//! Transaction coordinator
//!
//! Entry point of the engine. Each call to [`TransactionCoordinator::execute`]
//! advances the logical clock once, dispatches the instruction and runs every
//! consequence to completion: lock grants from drained queues, deadlock
//! aborts, retries after recovery and replay of instructions that arrived
//! while a transaction was waiting. The events produced along the way are
//! returned in order.

use crate::data_manager::{Attempt, DataManager, SnapshotRead};
use crate::error::{Error, Result};
use crate::event::{AbortReason, Event, WaitTarget};
use crate::transaction::{Transaction, TransactionManager, TransactionStatus, Waiter};
use repdb_common::{
    DumpScope, EngineConfig, Instruction, LogicalClock, Operation, SiteId, Timestamp, TransactionId,
    Value, VariableId,
};
use repdb_site::{LockMode, Site};
use std::collections::BTreeSet;

/// What happened to a dispatched data operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// The operation finished and produced its event
    Completed,
    /// The operation is parked on a lock queue or site wait queue
    Suspended,
    /// The transaction was aborted while trying
    Aborted,
}

fn lock_mode(operation: Operation) -> LockMode {
    if operation.is_write() {
        LockMode::Exclusive
    } else {
        LockMode::Shared
    }
}

/// Sequences instructions over the data manager
#[derive(Debug)]
pub struct TransactionCoordinator {
    config: EngineConfig,
    clock: LogicalClock,
    transactions: TransactionManager,
    data: DataManager,
}

impl TransactionCoordinator {
    /// Fails if the configuration has no sites or no variables
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: LogicalClock::new(),
            transactions: TransactionManager::new(),
            data: DataManager::new(config),
        })
    }

    /// Process one instruction and return the events it caused
    ///
    /// An invalid instruction is rejected before the clock advances and
    /// leaves no trace.
    pub fn execute(&mut self, instruction: Instruction) -> Result<Vec<Event>> {
        self.validate(&instruction)?;
        let now = self.clock.tick();
        tracing::debug!(time = %now, ?instruction, "dispatching");

        let result = self
            .dispatch(instruction, now)
            .and_then(|()| self.replay_resumed());
        let events = self.transactions.take_events();
        result?;

        debug_assert!(self.data.locks_consistent());
        Ok(events)
    }

    /// Process a sequence of instructions, stopping at the first invalid one
    pub fn run(&mut self, instructions: impl IntoIterator<Item = Instruction>) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for instruction in instructions {
            events.extend(self.execute(instruction)?);
        }
        Ok(events)
    }

    // === INSPECTION ===

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn transaction(&self, txn: TransactionId) -> Option<&Transaction> {
        self.transactions.get(txn).ok()
    }

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.data.site(id).ok()
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    /// Transactions queued for a lock on `var`, front first
    pub fn lock_queue(&self, var: VariableId) -> Vec<TransactionId> {
        self.transactions.lock_waiters(var)
    }

    /// Transactions waiting for `site`, front first
    pub fn wait_queue(&self, site: SiteId) -> Vec<TransactionId> {
        self.transactions.site_waiters(site)
    }

    /// Outgoing wait-for edges of `txn`
    pub fn waits_for(&self, txn: TransactionId) -> Vec<TransactionId> {
        self.transactions.waits_for(txn)
    }

    // === DISPATCH ===

    fn validate(&self, instruction: &Instruction) -> Result<()> {
        match *instruction {
            Instruction::Begin { txn } | Instruction::BeginReadOnly { txn } => {
                if self.transactions.contains(txn) {
                    return Err(Error::DuplicateTransaction(txn));
                }
                Ok(())
            }
            Instruction::Read { txn, variable } => {
                self.transactions.get(txn)?;
                self.check_variable(variable)
            }
            Instruction::Write { txn, variable, .. } => {
                let read_only = self.transactions.get(txn)?.is_read_only();
                self.check_variable(variable)?;
                if read_only {
                    return Err(Error::ReadOnlyWrite(txn));
                }
                Ok(())
            }
            Instruction::End { txn } => self.transactions.get(txn).map(|_| ()),
            Instruction::Fail { site } | Instruction::Recover { site } => self.check_site(site),
            Instruction::Dump(DumpScope::All) => Ok(()),
            Instruction::Dump(DumpScope::Site(site)) => self.check_site(site),
            Instruction::Dump(DumpScope::Variable(variable)) => self.check_variable(variable),
        }
    }

    fn check_variable(&self, variable: VariableId) -> Result<()> {
        if self.config.contains_variable(variable) {
            Ok(())
        } else {
            Err(Error::UnknownVariable(variable))
        }
    }

    fn check_site(&self, site: SiteId) -> Result<()> {
        if self.config.contains_site(site) {
            Ok(())
        } else {
            Err(Error::UnknownSite(site))
        }
    }

    fn dispatch(&mut self, instruction: Instruction, now: Timestamp) -> Result<()> {
        match instruction {
            Instruction::Begin { txn } => self.transactions.begin(txn, false, now),
            Instruction::BeginReadOnly { txn } => self.transactions.begin(txn, true, now),
            Instruction::Read { txn, .. } | Instruction::Write { txn, .. } | Instruction::End { txn } => {
                self.submit(txn, instruction)
            }
            Instruction::Fail { site } => self.fail(site),
            Instruction::Recover { site } => self.recover(site),
            Instruction::Dump(scope) => {
                let report = self.data.dump(scope)?;
                self.transactions.emit(Event::Dump(report));
                Ok(())
            }
        }
    }

    /// Run a transaction's instruction now, or hold it back while the transaction waits
    fn submit(&mut self, txn: TransactionId, instruction: Instruction) -> Result<()> {
        let status = self.transactions.get(txn)?.status();
        if status != TransactionStatus::Active {
            tracing::debug!(txn = %txn, ?status, "ignoring instruction for finished transaction");
            return Ok(());
        }

        if self.transactions.is_suspended(txn) {
            tracing::debug!(txn = %txn, ?instruction, "transaction is waiting, instruction deferred");
            self.transactions.get_mut(txn)?.push_backlog(instruction);
            return Ok(());
        }

        self.perform(txn, instruction).map(|_| ())
    }

    fn perform(&mut self, txn: TransactionId, instruction: Instruction) -> Result<OpOutcome> {
        match instruction {
            Instruction::Read { variable, .. } => self.read(txn, variable),
            Instruction::Write { variable, value, .. } => self.write(txn, variable, value),
            Instruction::End { .. } => self.end(txn).map(|()| OpOutcome::Completed),
            _ => Ok(OpOutcome::Completed),
        }
    }

    /// Replay held-back instructions of transactions whose wait ended
    fn replay_resumed(&mut self) -> Result<()> {
        while let Some(txn) = self.transactions.next_resumed() {
            while self.transactions.is_active(txn) && !self.transactions.is_suspended(txn) {
                let Some(next) = self.transactions.get_mut(txn)?.pop_backlog() else {
                    break;
                };
                tracing::debug!(txn = %txn, instruction = ?next, "replaying deferred instruction");
                self.perform(txn, next)?;
            }
        }
        Ok(())
    }

    // === READ / WRITE ===

    fn read(&mut self, txn: TransactionId, var: VariableId) -> Result<OpOutcome> {
        let operation = Operation::Read { variable: var };
        let t = self.transactions.get_mut(txn)?;
        t.set_current_operation(operation);
        let (read_only, held, buffered) = (t.is_read_only(), t.lock_mode(var), t.pending_write(var));

        if read_only {
            return self.snapshot_read(txn, var);
        }

        // Own write, or a re-read under a lock already held
        let local = match held {
            Some(LockMode::Exclusive) => buffered,
            Some(LockMode::Shared) => self.data.read_locked(txn, var),
            None => None,
        };
        if let Some(value) = local {
            self.transactions.emit(Event::Read {
                txn,
                variable: var,
                value,
            });
            return Ok(OpOutcome::Completed);
        }

        self.acquire(txn, operation)
    }

    fn write(&mut self, txn: TransactionId, var: VariableId, value: Value) -> Result<OpOutcome> {
        let operation = Operation::Write {
            variable: var,
            value,
        };
        self.transactions.get_mut(txn)?.set_current_operation(operation);
        self.acquire(txn, operation)
    }

    fn snapshot_read(&mut self, txn: TransactionId, var: VariableId) -> Result<OpOutcome> {
        let start = self.transactions.start_time(txn);
        match self.data.snapshot_read(var, start)? {
            SnapshotRead::Found { site, value } => {
                tracing::debug!(txn = %txn, variable = %var, site = %site, "snapshot read");
                self.transactions.emit(Event::Read {
                    txn,
                    variable: var,
                    value,
                });
                Ok(OpOutcome::Completed)
            }
            SnapshotRead::Wait => {
                let sites = self.data.failed_copies(var);
                self.park_on_sites(txn, var, sites);
                Ok(OpOutcome::Suspended)
            }
            SnapshotRead::Unavailable => {
                self.abort(txn, AbortReason::NoConsistentSnapshot { variable: var })?;
                Ok(OpOutcome::Aborted)
            }
        }
    }

    /// Acquire the locks for `operation`, or queue behind whoever blocks it
    fn acquire(&mut self, txn: TransactionId, operation: Operation) -> Result<OpOutcome> {
        let var = operation.variable();
        let mode = lock_mode(operation);

        // A transaction already holding a lock on `var` does not queue behind waiters
        let upgrading = self.transactions.get(txn)?.lock_mode(var).is_some();

        loop {
            let queued = if upgrading {
                Vec::new()
            } else {
                self.transactions.conflicting_waiters(var, txn, mode)
            };

            let blockers: BTreeSet<TransactionId> = match self.data.attempt(txn, var, mode)? {
                Attempt::Ready { sites } if queued.is_empty() => {
                    self.grant(txn, operation, &sites)?;
                    return Ok(OpOutcome::Completed);
                }
                Attempt::Ready { .. } => queued.into_iter().collect(),
                Attempt::Unavailable { sites } => {
                    self.park_on_sites(txn, var, sites);
                    return Ok(OpOutcome::Suspended);
                }
                Attempt::Blocked { mut holders } => {
                    holders.extend(queued);
                    holders
                }
            };

            self.transactions.set_waiting(txn, blockers.iter().copied());
            if let Some(deadlock) = self.transactions.detect_deadlock(txn) {
                self.abort_victim(deadlock.victim, var)?;
                if deadlock.victim == txn {
                    return Ok(OpOutcome::Aborted);
                }
                continue;
            }

            if upgrading {
                self.transactions.enqueue_upgrade(var, txn, mode);
                self.refresh_queue_edges(var);
            } else {
                self.transactions.enqueue_lock(var, txn, mode);
            }
            self.transactions.emit(Event::Waiting {
                txn,
                variable: var,
                on: WaitTarget::Lock {
                    blockers: blockers.into_iter().collect(),
                },
            });
            return Ok(OpOutcome::Suspended);
        }
    }

    /// Lock `sites` for the operation and complete it
    fn grant(&mut self, txn: TransactionId, operation: Operation, sites: &[SiteId]) -> Result<()> {
        let var = operation.variable();
        let mode = lock_mode(operation);

        for &site in sites {
            let fresh = self.data.grant(site, txn, var, mode)?;
            self.transactions
                .get_mut(txn)?
                .record_lock(var, mode, site, fresh);
        }
        self.transactions.clear_waiting(txn);

        match operation {
            Operation::Read { .. } => {
                if let Some(&site) = sites.first() {
                    let value = self.data.read_current(site, var)?;
                    self.transactions.emit(Event::Read {
                        txn,
                        variable: var,
                        value,
                    });
                }
            }
            Operation::Write { value, .. } => {
                self.transactions.get_mut(txn)?.buffer_write(var, value);
                self.transactions.emit(Event::Wrote {
                    txn,
                    variable: var,
                    value,
                    scope: self.data.write_scope(var),
                });
            }
        }
        Ok(())
    }

    fn park_on_sites(&mut self, txn: TransactionId, var: VariableId, sites: Vec<SiteId>) {
        self.transactions.clear_waiting(txn);
        self.transactions.enqueue_wait(txn, &sites);
        self.transactions.emit(Event::Waiting {
            txn,
            variable: var,
            on: WaitTarget::Sites { sites },
        });
    }

    // === COMMIT / ABORT ===

    fn end(&mut self, txn: TransactionId) -> Result<()> {
        let now = self.clock.now();
        let t = self.transactions.get(txn)?;
        let locks = t.locks_held().to_vec();
        let summary = self
            .data
            .commit(txn, &locks, |var| t.pending_write(var), now)?;

        self.transactions.terminate(txn, TransactionStatus::Committed)?;
        tracing::info!(txn = %txn, writes = summary.writes.len(), time = %now, "transaction committed");
        self.transactions.emit(Event::Committed {
            txn,
            writes: summary.writes,
        });

        for var in locks {
            self.drain_lock_queue(var)?;
        }
        for site in summary.readable_again {
            self.drain_wait_queue(site)?;
        }
        Ok(())
    }

    /// Abort a transaction and hand its locks and queue slots to the waiters behind it
    fn abort(&mut self, txn: TransactionId, reason: AbortReason) -> Result<()> {
        if !self.transactions.is_active(txn) {
            return Ok(());
        }

        tracing::info!(txn = %txn, ?reason, "transaction aborted");
        self.transactions.emit(Event::Aborted { txn, reason });

        // Locks at a failed site are already gone, so the held set comes from the transaction
        let mut vacated: BTreeSet<VariableId> = self.transactions.get(txn)?.locks_held().iter().copied().collect();
        vacated.extend(self.data.release_all(txn));
        vacated.extend(self.transactions.terminate(txn, TransactionStatus::Aborted)?);

        for var in vacated {
            self.drain_lock_queue(var)?;
        }
        Ok(())
    }

    /// Abort a deadlock victim, naming the variable it was trying to lock
    fn abort_victim(&mut self, victim: TransactionId, requested: VariableId) -> Result<()> {
        let variable = self
            .transactions
            .get(victim)?
            .current_operation()
            .map(|op| op.variable())
            .unwrap_or(requested);
        self.abort(victim, AbortReason::Deadlock { variable })
    }

    // === SITES ===

    fn fail(&mut self, site: SiteId) -> Result<()> {
        if !self.data.site(site)?.is_up() {
            tracing::warn!(site = %site, "fail ignored: site is already down");
            return Ok(());
        }

        let now = self.clock.now();
        let mut victims: BTreeSet<TransactionId> = self.transactions.residents(site).into_iter().collect();
        victims.extend(self.data.fail(site, now)?);
        self.transactions.emit(Event::SiteFailed { site });

        for txn in victims {
            self.abort(txn, AbortReason::SiteFailure { site })?;
        }
        Ok(())
    }

    fn recover(&mut self, site: SiteId) -> Result<()> {
        let now = self.clock.now();
        if !self.data.recover(site, now)? {
            tracing::warn!(site = %site, "recover ignored: site is not down");
            return Ok(());
        }

        self.transactions.emit(Event::SiteRecovered { site });
        self.drain_wait_queue(site)
    }

    // === QUEUE DRAINS ===

    /// Retry every transaction waiting for `site`
    fn drain_wait_queue(&mut self, site: SiteId) -> Result<()> {
        for txn in self.transactions.take_wait_queue(site) {
            if !self.transactions.is_active(txn) {
                continue;
            }
            self.transactions.leave_wait_queues(txn);

            let Some(operation) = self.transactions.get(txn)?.current_operation() else {
                continue;
            };
            tracing::debug!(txn = %txn, site = %site, "retrying after site became available");

            let outcome = match operation {
                Operation::Read { variable } => self.read(txn, variable)?,
                Operation::Write { variable, value } => self.write(txn, variable, value)?,
            };
            if outcome == OpOutcome::Completed {
                self.transactions.mark_resumed(txn);
            }
        }
        Ok(())
    }

    /// Grant queued requests on `var` front first, for as long as the front can proceed
    ///
    /// Contiguous shared requests are granted together; an exclusive request
    /// stops the run behind it until it is granted.
    fn drain_lock_queue(&mut self, var: VariableId) -> Result<()> {
        while let Some(Waiter { txn, mode }) = self.transactions.lock_queue_front(var) {
            let operation = match self.transactions.get(txn) {
                Ok(t) if t.is_active() => t.current_operation(),
                _ => None,
            };
            let Some(operation) = operation.filter(|op| op.variable() == var) else {
                self.transactions.pop_lock_queue(var);
                continue;
            };

            match self.data.attempt(txn, var, mode)? {
                Attempt::Ready { sites } => {
                    self.transactions.pop_lock_queue(var);
                    tracing::debug!(txn = %txn, variable = %var, "granted from lock queue");
                    self.grant(txn, operation, &sites)?;
                    self.transactions.mark_resumed(txn);
                }
                Attempt::Unavailable { sites } => {
                    self.transactions.pop_lock_queue(var);
                    self.park_on_sites(txn, var, sites);
                }
                Attempt::Blocked { holders } => {
                    self.transactions.set_waiting(txn, holders);
                    match self.transactions.detect_deadlock(txn) {
                        Some(deadlock) => self.abort_victim(deadlock.victim, var)?,
                        None => break,
                    }
                }
            }
        }

        self.refresh_queue_edges(var);
        Ok(())
    }

    /// Recompute the wait-for edges of everyone still queued on `var`
    fn refresh_queue_edges(&mut self, var: VariableId) {
        let queue = self.transactions.lock_queue(var);
        for (position, waiter) in queue.iter().enumerate() {
            let mut blockers = self.data.conflicting_holders(waiter.txn, var, waiter.mode);
            let holds_lock = self
                .transactions
                .get(waiter.txn)
                .is_ok_and(|t| t.lock_mode(var).is_some());
            if !holds_lock {
                blockers.extend(
                    queue[..position]
                        .iter()
                        .filter(|ahead| ahead.txn != waiter.txn && !ahead.mode.is_compatible_with(waiter.mode))
                        .map(|ahead| ahead.txn),
                );
            }
            self.transactions.set_waiting(waiter.txn, blockers);
        }
    }
}
