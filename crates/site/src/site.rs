//! A site: one variable store plus one lock table
//!
//! All mutation of a site's locks and copies goes through these methods.

use crate::error::{Error, Result};
use crate::lock::{LockAttemptResult, LockMode, LockTable};
use crate::store::VariableStore;
use crate::variable::Variable;
use repdb_common::{EngineConfig, SiteId, Timestamp, TransactionId, Value, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Availability of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteState {
    /// Up since the start of the run
    Running,
    /// Down; holds no locks and serves nothing
    Failed,
    /// Up again after a failure; replicated copies are unreadable until rewritten
    Recovered,
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteState::Running => write!(f, "running"),
            SiteState::Failed => write!(f, "failed"),
            SiteState::Recovered => write!(f, "recovered"),
        }
    }
}

/// A period during which the site was down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downtime {
    pub failed_at: Timestamp,
    pub recovered_at: Option<Timestamp>,
}

/// One simulated database site
#[derive(Debug, Clone)]
pub struct Site {
    id: SiteId,
    state: SiteState,
    store: VariableStore,
    locks: LockTable,
    downtime: Vec<Downtime>,
}

impl Site {
    pub fn new(id: SiteId, config: &EngineConfig) -> Self {
        Self {
            id,
            state: SiteState::Running,
            store: VariableStore::for_site(id, config),
            locks: LockTable::new(),
            downtime: Vec::new(),
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn state(&self) -> SiteState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state != SiteState::Failed
    }

    pub fn holds(&self, var: VariableId) -> bool {
        self.store.contains(var)
    }

    pub fn variable(&self, var: VariableId) -> Option<&Variable> {
        self.store.get(var)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.store.iter()
    }

    pub fn variable_count(&self) -> usize {
        self.store.len()
    }

    pub fn downtime(&self) -> &[Downtime] {
        &self.downtime
    }

    // === FAILURE AND RECOVERY ===

    /// Take the site down, dropping every lock. Returns the former lock holders.
    pub fn fail(&mut self, at: Timestamp) -> BTreeSet<TransactionId> {
        if self.state == SiteState::Failed {
            return BTreeSet::new();
        }

        let holders = self.locks.transactions();
        self.state = SiteState::Failed;
        self.locks.clear();
        self.downtime.push(Downtime {
            failed_at: at,
            recovered_at: None,
        });

        tracing::info!(site = %self.id, dropped_holders = holders.len(), "site failed");
        holders
    }

    /// Bring the site back with an empty lock table and unreadable replicated copies
    pub fn recover(&mut self, at: Timestamp) -> bool {
        if self.state != SiteState::Failed {
            return false;
        }

        self.state = SiteState::Recovered;
        self.locks = LockTable::new();
        self.store.mark_replicated_unreadable();
        if let Some(last) = self.downtime.last_mut() {
            last.recovered_at = Some(at);
        }

        tracing::info!(site = %self.id, "site recovered");
        true
    }

    /// Whether the site stayed up for the whole of `[from, to]`
    pub fn was_up_between(&self, from: Timestamp, to: Timestamp) -> bool {
        self.downtime.iter().all(|down| {
            let recovered = down.recovered_at.unwrap_or(Timestamp::new(u64::MAX));
            recovered <= from || down.failed_at > to
        })
    }

    // === LOCKING ===

    pub fn check_lock(
        &self,
        tx_id: TransactionId,
        var: VariableId,
        mode: LockMode,
    ) -> Result<LockAttemptResult> {
        self.ensure_serves(var)?;
        Ok(self.locks.check(tx_id, var, mode))
    }

    /// Grant a checked lock. Returns true if this is a new lock for the transaction here.
    pub fn grant_lock(&mut self, tx_id: TransactionId, var: VariableId, mode: LockMode) -> Result<bool> {
        self.ensure_serves(var)?;
        let fresh = self.locks.grant(tx_id, var, mode);
        tracing::debug!(site = %self.id, txn = %tx_id, variable = %var, ?mode, "lock granted");
        Ok(fresh)
    }

    pub fn release_lock(&mut self, tx_id: TransactionId, var: VariableId) -> Option<LockMode> {
        self.locks.release(tx_id, var)
    }

    pub fn release_all(&mut self, tx_id: TransactionId) -> Vec<VariableId> {
        self.locks.release_all(tx_id)
    }

    pub fn lock_mode(&self, tx_id: TransactionId, var: VariableId) -> Option<LockMode> {
        self.locks.mode_held(tx_id, var)
    }

    pub fn lock_holders(&self, var: VariableId) -> Vec<(TransactionId, LockMode)> {
        self.locks.holders(var)
    }

    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    // === DATA ===

    /// Whether an ordinary read of `var` can be served here now
    pub fn can_read(&self, var: VariableId) -> bool {
        self.is_up() && self.store.get(var).is_some_and(Variable::is_readable)
    }

    /// Latest committed value for an ordinary (locking) read
    pub fn read_current(&self, var: VariableId) -> Result<Value> {
        self.ensure_serves(var)?;
        let copy = self.copy(var)?;
        if !copy.is_readable() {
            return Err(Error::NotReadable {
                site: self.id,
                variable: var,
            });
        }
        Ok(copy.value())
    }

    /// Latest version committed strictly before `before`, for snapshot reads
    pub fn read_version_before(&self, var: VariableId, before: Timestamp) -> Result<(Timestamp, Value)> {
        self.ensure_serves(var)?;
        let copy = self.copy(var)?;
        copy.version_before(before).ok_or(Error::NotStored {
            site: self.id,
            variable: var,
        })
    }

    /// Commit a value. Returns true if the copy became readable again.
    pub fn commit(&mut self, var: VariableId, value: Value, at: Timestamp) -> Result<bool> {
        self.ensure_serves(var)?;
        let site = self.id;
        let copy = self
            .store
            .get_mut(var)
            .ok_or(Error::NotStored { site, variable: var })?;
        let became_readable = copy.commit(value, at);
        tracing::debug!(site = %site, variable = %var, value, time = %at, "value committed");
        Ok(became_readable)
    }

    fn copy(&self, var: VariableId) -> Result<&Variable> {
        self.store.get(var).ok_or(Error::NotStored {
            site: self.id,
            variable: var,
        })
    }

    fn ensure_serves(&self, var: VariableId) -> Result<()> {
        if !self.is_up() {
            return Err(Error::SiteDown(self.id));
        }
        if !self.store.contains(var) {
            return Err(Error::NotStored {
                site: self.id,
                variable: var,
            });
        }
        Ok(())
    }
}
