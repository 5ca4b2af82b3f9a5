//! Error types for site access

use repdb_common::{SiteId, VariableId};
use thiserror::Error;

/// Result type for site operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a site cannot serve a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Site {0} is down")]
    SiteDown(SiteId),

    #[error("Variable {variable} is not stored at site {site}")]
    NotStored { site: SiteId, variable: VariableId },

    #[error("Variable {variable} at site {site} is not readable until it is rewritten")]
    NotReadable { site: SiteId, variable: VariableId },
}
