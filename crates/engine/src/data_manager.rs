//! Data manager: routes operations to site copies
//!
//! The data manager owns every site. It decides which copies an operation
//! must touch (available copies: every up site for writes, every readable
//! up site for reads), checks and grants the per-site locks, serves
//! snapshot reads from version history and applies writes at commit. It
//! never queues anything itself; blocked attempts are reported back to the
//! coordinator.

use crate::error::{Error, Result};
use crate::event::{CommittedWrite, DumpReport, SiteDump, WriteScope};
use repdb_common::{DumpScope, EngineConfig, Placement, SiteId, Timestamp, TransactionId, Value, VariableId};
use repdb_site::{LockAttemptResult, LockMode, Site};
use std::collections::BTreeSet;

/// Outcome of checking whether a lock request could be granted now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Every required copy is lockable; lock these sites
    Ready { sites: Vec<SiteId> },
    /// No copy can serve the request; wait for these sites
    Unavailable { sites: Vec<SiteId> },
    /// Other transactions hold conflicting locks
    Blocked { holders: BTreeSet<TransactionId> },
}

/// Outcome of a read-only transaction's snapshot read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRead {
    Found { site: SiteId, value: Value },
    /// Only failed sites could still serve it
    Wait,
    /// No site can ever serve a consistent version
    Unavailable,
}

/// What a commit changed
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    pub writes: Vec<CommittedWrite>,
    /// Sites where a commit made a replicated copy readable again
    pub readable_again: BTreeSet<SiteId>,
}

/// Owner of all sites
#[derive(Debug)]
pub struct DataManager {
    config: EngineConfig,
    sites: Vec<Site>,
}

impl DataManager {
    pub fn new(config: EngineConfig) -> Self {
        let sites = SiteId::all(config.site_count)
            .map(|id| Site::new(id, &config))
            .collect();
        Self { config, sites }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn site(&self, id: SiteId) -> Result<&Site> {
        self.index(id).map(|i| &self.sites[i])
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    fn site_mut(&mut self, id: SiteId) -> Result<&mut Site> {
        let i = self.index(id)?;
        Ok(&mut self.sites[i])
    }

    fn index(&self, id: SiteId) -> Result<usize> {
        if self.config.contains_site(id) {
            Ok(id.get() as usize - 1)
        } else {
            Err(Error::UnknownSite(id))
        }
    }

    pub fn placement(&self, var: VariableId) -> Placement {
        var.placement(self.config.site_count)
    }

    /// Sites holding a copy of `var`, ascending
    pub fn check_set(&self, var: VariableId) -> Vec<SiteId> {
        self.placement(var).sites(self.config.site_count)
    }

    fn copies(&self, var: VariableId) -> impl Iterator<Item = &Site> {
        let placement = self.placement(var);
        self.sites.iter().filter(move |site| placement.includes(site.id()))
    }

    // === LOCKING ===

    /// Check whether `txn` could lock `var` in `mode` right now
    pub fn attempt(&self, txn: TransactionId, var: VariableId, mode: LockMode) -> Result<Attempt> {
        let up: Vec<&Site> = self.copies(var).filter(|site| site.is_up()).collect();
        if up.is_empty() {
            return Ok(Attempt::Unavailable {
                sites: self.check_set(var),
            });
        }

        let targets: Vec<&Site> = match mode {
            LockMode::Exclusive => up.clone(),
            LockMode::Shared => up.iter().copied().filter(|site| site.can_read(var)).collect(),
        };
        if targets.is_empty() {
            // Every up copy was recovered and not yet rewritten
            return Ok(Attempt::Unavailable {
                sites: up.iter().map(|site| site.id()).collect(),
            });
        }

        let mut holders = BTreeSet::new();
        for site in &targets {
            if let LockAttemptResult::Conflict { holders: conflicts } = site.check_lock(txn, var, mode)? {
                holders.extend(conflicts.into_iter().map(|(holder, _)| holder));
            }
        }

        if holders.is_empty() {
            Ok(Attempt::Ready {
                sites: targets.iter().map(|site| site.id()).collect(),
            })
        } else {
            Ok(Attempt::Blocked { holders })
        }
    }

    /// Transactions holding locks on `var` that conflict with `mode`
    pub fn conflicting_holders(&self, txn: TransactionId, var: VariableId, mode: LockMode) -> BTreeSet<TransactionId> {
        self.copies(var)
            .filter(|site| site.is_up())
            .flat_map(|site| site.lock_holders(var))
            .filter(|(holder, held)| *holder != txn && !held.is_compatible_with(mode))
            .map(|(holder, _)| holder)
            .collect()
    }

    /// Grant a lock at one site. Returns true if it is new for `txn` there.
    pub fn grant(&mut self, site: SiteId, txn: TransactionId, var: VariableId, mode: LockMode) -> Result<bool> {
        Ok(self.site_mut(site)?.grant_lock(txn, var, mode)?)
    }

    /// Release everything `txn` holds at every up site
    pub fn release_all(&mut self, txn: TransactionId) -> BTreeSet<VariableId> {
        self.sites
            .iter_mut()
            .filter(|site| site.is_up())
            .flat_map(|site| site.release_all(txn))
            .collect()
    }

    pub fn write_scope(&self, var: VariableId) -> WriteScope {
        match self.placement(var) {
            Placement::Replicated => WriteScope::AllSites,
            Placement::Single(site) => WriteScope::Site(site),
        }
    }

    // === READS ===

    /// Current committed value from one site
    pub fn read_current(&self, site: SiteId, var: VariableId) -> Result<Value> {
        Ok(self.site(site)?.read_current(var)?)
    }

    /// Current value from the lowest-id up site where `txn` holds a lock on `var`
    pub fn read_locked(&self, txn: TransactionId, var: VariableId) -> Option<Value> {
        self.copies(var)
            .filter(|site| site.is_up() && site.lock_mode(txn, var).is_some())
            .find_map(|site| site.read_current(var).ok())
    }

    /// Latest version of `var` committed strictly before `start`
    ///
    /// A replicated copy only qualifies if its site stayed up from that
    /// version's commit until `start`.
    pub fn snapshot_read(&self, var: VariableId, start: Timestamp) -> Result<SnapshotRead> {
        let replicated = self.placement(var).is_replicated();
        let mut any_failed = false;

        for site in self.copies(var) {
            if !site.is_up() {
                any_failed = true;
                continue;
            }
            let (committed_at, value) = site.read_version_before(var, start)?;
            if !replicated || site.was_up_between(committed_at, start) {
                return Ok(SnapshotRead::Found {
                    site: site.id(),
                    value,
                });
            }
        }

        if any_failed {
            Ok(SnapshotRead::Wait)
        } else {
            Ok(SnapshotRead::Unavailable)
        }
    }

    /// Failed sites holding a copy of `var`
    pub fn failed_copies(&self, var: VariableId) -> Vec<SiteId> {
        self.copies(var)
            .filter(|site| !site.is_up())
            .map(Site::id)
            .collect()
    }

    // === COMMIT ===

    /// Apply `txn`'s buffered writes and release its locks, variable by variable
    ///
    /// `locks` is in acquisition order; `pending` yields the buffered value
    /// for each written variable.
    pub fn commit(
        &mut self,
        txn: TransactionId,
        locks: &[VariableId],
        pending: impl Fn(VariableId) -> Option<Value>,
        at: Timestamp,
    ) -> Result<CommitSummary> {
        let mut summary = CommitSummary::default();

        for &var in locks {
            let scope = self.write_scope(var);
            let placement = self.placement(var);
            let mut written = Vec::new();
            let value = pending(var);

            for site in self.sites.iter_mut() {
                if !placement.includes(site.id()) || !site.is_up() {
                    continue;
                }
                let Some(mode) = site.release_lock(txn, var) else {
                    continue;
                };
                if let (LockMode::Exclusive, Some(value)) = (mode, value) {
                    if site.commit(var, value, at)? {
                        summary.readable_again.insert(site.id());
                    }
                    written.push(site.id());
                }
            }

            match value {
                Some(value) if !written.is_empty() => summary.writes.push(CommittedWrite {
                    variable: var,
                    value,
                    scope,
                    sites: written,
                }),
                _ => {}
            }
        }

        Ok(summary)
    }

    // === FAILURE AND RECOVERY ===

    /// Fail a site. Returns the transactions that held locks there.
    pub fn fail(&mut self, id: SiteId, at: Timestamp) -> Result<BTreeSet<TransactionId>> {
        Ok(self.site_mut(id)?.fail(at))
    }

    /// Recover a site. Returns false if it was not failed.
    pub fn recover(&mut self, id: SiteId, at: Timestamp) -> Result<bool> {
        Ok(self.site_mut(id)?.recover(at))
    }

    /// Lock tables everywhere hold the shared-or-single-exclusive shape
    pub fn locks_consistent(&self) -> bool {
        self.sites.iter().all(|site| site.lock_table().all_consistent())
    }

    // === DUMP ===

    pub fn dump(&self, scope: DumpScope) -> Result<DumpReport> {
        match scope {
            DumpScope::All => Ok(DumpReport::Sites(
                self.sites.iter().map(Self::dump_site).collect(),
            )),
            DumpScope::Site(id) => Ok(DumpReport::Sites(vec![Self::dump_site(self.site(id)?)])),
            DumpScope::Variable(var) => {
                if !self.config.contains_variable(var) {
                    return Err(Error::UnknownVariable(var));
                }
                let values = self
                    .copies(var)
                    .filter_map(|site| {
                        site.variable(var)
                            .filter(|copy| copy.is_committed())
                            .map(|copy| (site.id(), copy.value()))
                    })
                    .collect();
                Ok(DumpReport::Variable {
                    variable: var,
                    values,
                })
            }
        }
    }

    fn dump_site(site: &Site) -> SiteDump {
        let committed = site
            .variables()
            .filter(|copy| copy.is_committed())
            .map(|copy| (copy.id(), copy.value()))
            .collect();
        SiteDump {
            site: site.id(),
            committed,
            has_initial_values: site.variables().any(|copy| !copy.is_committed()),
        }
    }
}
