//! Observable outcomes of dispatching instructions

use repdb_common::{SiteId, TransactionId, Value, VariableId};
use serde::{Deserialize, Serialize};

/// Something the engine did in response to an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A read returned a value
    Read {
        txn: TransactionId,
        variable: VariableId,
        value: Value,
    },

    /// A write acquired its locks; the value is applied at commit
    Wrote {
        txn: TransactionId,
        variable: VariableId,
        value: Value,
        scope: WriteScope,
    },

    /// An operation could not proceed and was parked
    Waiting {
        txn: TransactionId,
        variable: VariableId,
        on: WaitTarget,
    },

    /// A transaction committed its buffered writes
    Committed {
        txn: TransactionId,
        writes: Vec<CommittedWrite>,
    },

    /// A transaction was aborted
    Aborted {
        txn: TransactionId,
        reason: AbortReason,
    },

    SiteFailed {
        site: SiteId,
    },

    SiteRecovered {
        site: SiteId,
    },

    Dump(DumpReport),
}

/// Which copies a write went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteScope {
    /// Every site that was up
    AllSites,
    /// The single owning site
    Site(SiteId),
}

/// What a parked operation waits for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitTarget {
    /// Conflicting lock holders or earlier waiters
    Lock { blockers: Vec<TransactionId> },
    /// Sites that are down or cannot serve the read yet
    Sites { sites: Vec<SiteId> },
}

/// A value made visible at commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedWrite {
    pub variable: VariableId,
    pub value: Value,
    pub scope: WriteScope,
    pub sites: Vec<SiteId>,
}

/// Why a transaction was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Chosen as the victim of a wait-for cycle closed by a request on `variable`
    Deadlock { variable: VariableId },
    /// Held a lock at a site that failed
    SiteFailure { site: SiteId },
    /// No up site could serve a consistent snapshot of `variable`
    NoConsistentSnapshot { variable: VariableId },
}

/// Committed state reported by `dump`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpReport {
    /// Per site, the committed variables
    Sites(Vec<SiteDump>),
    /// Per site, the committed value of one variable
    Variable {
        variable: VariableId,
        values: Vec<(SiteId, Value)>,
    },
}

/// Committed variables at one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDump {
    pub site: SiteId,
    pub committed: Vec<(VariableId, Value)>,
    /// Some variables at this site still hold their initial value
    pub has_initial_values: bool,
}
