//! Error types for the engine
//!
//! Only structurally invalid instructions are errors. Lock conflicts, failed
//! sites, deadlocks and instructions for finished transactions are normal
//! protocol outcomes and surface as events instead.

use repdb_common::{ConfigError, SiteId, TransactionId, VariableId};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that reject an instruction without touching any state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Transaction not found: {0}")]
    UnknownTransaction(TransactionId),

    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(TransactionId),

    #[error("Variable does not exist: {0}")]
    UnknownVariable(VariableId),

    #[error("Site does not exist: {0}")]
    UnknownSite(SiteId),

    #[error("Read-only transaction {0} cannot write")]
    ReadOnlyWrite(TransactionId),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Site access failed: {0}")]
    Site(#[from] repdb_site::Error),
}
