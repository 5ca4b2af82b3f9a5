//! Per-transaction state

use repdb_common::{Instruction, Operation, SiteId, Timestamp, TransactionId, Value, VariableId};
use repdb_site::LockMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Lifecycle of a transaction
///
/// Waiting is not a status: a transaction waits while its current operation
/// sits on a lock queue or wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

/// Complete state for a single transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    read_only: bool,
    start_time: Timestamp,
    status: TransactionStatus,

    /// Variables locked, in acquisition order (release order at commit)
    locks_held: Vec<VariableId>,

    /// Strongest mode held per variable
    lock_modes: BTreeMap<VariableId, LockMode>,

    /// Values written but not yet committed
    pending_writes: BTreeMap<VariableId, Value>,

    /// Number of locks held at each site
    site_presence: BTreeMap<SiteId, u32>,

    /// Last dispatched data operation, retried when pulled off a queue
    current_operation: Option<Operation>,

    /// Instructions that arrived while the current operation was waiting
    backlog: VecDeque<Instruction>,
}

impl Transaction {
    pub fn new(id: TransactionId, read_only: bool, start_time: Timestamp) -> Self {
        Self {
            id,
            read_only,
            start_time,
            status: TransactionStatus::Active,
            locks_held: Vec::new(),
            lock_modes: BTreeMap::new(),
            pending_writes: BTreeMap::new(),
            site_presence: BTreeMap::new(),
            current_operation: None,
            backlog: VecDeque::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    pub fn locks_held(&self) -> &[VariableId] {
        &self.locks_held
    }

    pub fn lock_mode(&self, var: VariableId) -> Option<LockMode> {
        self.lock_modes.get(&var).copied()
    }

    pub fn pending_write(&self, var: VariableId) -> Option<Value> {
        self.pending_writes.get(&var).copied()
    }

    pub fn presence_at(&self, site: SiteId) -> u32 {
        self.site_presence.get(&site).copied().unwrap_or(0)
    }

    pub fn current_operation(&self) -> Option<Operation> {
        self.current_operation
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    // === MUTATION (driven by the data manager) ===

    pub(crate) fn set_current_operation(&mut self, operation: Operation) {
        self.current_operation = Some(operation);
    }

    /// Record a lock granted at `site`; `fresh` is false for upgrades and re-grants
    pub(crate) fn record_lock(&mut self, var: VariableId, mode: LockMode, site: SiteId, fresh: bool) {
        if !self.locks_held.contains(&var) {
            self.locks_held.push(var);
        }

        let held = self.lock_modes.entry(var).or_insert(mode);
        if mode == LockMode::Exclusive {
            *held = LockMode::Exclusive;
        }

        if fresh {
            *self.site_presence.entry(site).or_insert(0) += 1;
        }
    }

    pub(crate) fn buffer_write(&mut self, var: VariableId, value: Value) {
        self.pending_writes.insert(var, value);
    }

    pub(crate) fn push_backlog(&mut self, instruction: Instruction) {
        self.backlog.push_back(instruction);
    }

    pub(crate) fn pop_backlog(&mut self) -> Option<Instruction> {
        self.backlog.pop_front()
    }

    /// Finish the transaction and drop every lock record
    pub(crate) fn terminate(&mut self, status: TransactionStatus) {
        debug_assert!(status != TransactionStatus::Active);
        self.status = status;
        self.locks_held.clear();
        self.lock_modes.clear();
        self.pending_writes.clear();
        self.site_presence.clear();
        self.backlog.clear();
    }
}
