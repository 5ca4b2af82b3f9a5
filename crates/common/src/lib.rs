//! Common types for repdb
//!
//! This crate defines:
//! - Identifiers for transactions, variables and sites
//! - The logical clock that orders every dispatched instruction
//! - The closed instruction set consumed by the coordinator
//! - Variable placement (which sites hold a copy of which variable)

mod config;
mod instruction;
mod placement;
mod site_id;
mod timestamp;
mod transaction_id;
mod variable_id;

pub use config::{ConfigError, EngineConfig};
pub use instruction::{DumpScope, Instruction, Operation};
pub use placement::Placement;
pub use site_id::SiteId;
pub use timestamp::{LogicalClock, Timestamp};
pub use transaction_id::TransactionId;
pub use variable_id::VariableId;

/// Values stored in variables
pub type Value = i64;
