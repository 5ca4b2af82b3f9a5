//! Per-site storage for repdb
//!
//! Each site owns a multiversion variable store and a lock table with
//! shared/exclusive modes. Both are reached only through [`Site`].

pub mod error;
pub mod lock;
pub mod site;
pub mod store;
pub mod variable;

pub use error::{Error, Result};
pub use lock::{LockAttemptResult, LockInfo, LockMode, LockTable};
pub use site::{Downtime, Site, SiteState};
pub use store::VariableStore;
pub use variable::Variable;
