//! Concurrency control and recovery engine for repdb
//!
//! This crate sequences transaction operations over replicated sites:
//! - Strict two-phase locking with shared/exclusive locks per site
//! - Available-copies replication: writes lock every up copy
//! - Multiversion snapshot reads for read-only transactions
//! - Wait-for graph deadlock detection that aborts the youngest member of a cycle
//! - Site failure and recovery with queued retries
//!
//! Everything runs on a single thread; a blocked operation is parked on a
//! queue and resumed only when a lock release or recovery drains that queue.

pub mod coordinator;
pub mod data_manager;
pub mod deadlock;
pub mod error;
pub mod event;
pub mod transaction;

pub use coordinator::{OpOutcome, TransactionCoordinator};
pub use data_manager::{Attempt, CommitSummary, DataManager, SnapshotRead};
pub use deadlock::{Deadlock, DeadlockDetector, WaitForGraph};
pub use error::{Error, Result};
pub use event::{AbortReason, CommittedWrite, DumpReport, Event, SiteDump, WaitTarget, WriteScope};
pub use transaction::{Transaction, TransactionManager, TransactionStatus};

pub use repdb_common::{
    ConfigError, DumpScope, EngineConfig, Instruction, Operation, SiteId, Timestamp, TransactionId, Value,
    VariableId,
};
pub use repdb_site::{LockMode, SiteState};
