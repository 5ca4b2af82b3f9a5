//! Replication rule
//!
//! Even-indexed variables are replicated on every site. Odd-indexed variables
//! live on exactly one site, `1 + index mod site_count`, whatever that site's
//! state.

use crate::{SiteId, VariableId};
use serde::{Deserialize, Serialize};

/// Where the copies of a variable live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// A copy on every site
    Replicated,
    /// A single copy on the given site
    Single(SiteId),
}

impl Placement {
    pub fn of(variable: VariableId, site_count: u32) -> Self {
        if variable.is_replicated() {
            Placement::Replicated
        } else {
            Placement::Single(SiteId::new(1 + variable.index() % site_count))
        }
    }

    pub fn is_replicated(&self) -> bool {
        matches!(self, Placement::Replicated)
    }

    /// Sites that must be consulted for an operation on the variable
    pub fn sites(&self, site_count: u32) -> Vec<SiteId> {
        match self {
            Placement::Replicated => SiteId::all(site_count).collect(),
            Placement::Single(site) => vec![*site],
        }
    }

    /// Whether the given site holds a copy
    pub fn includes(&self, site: SiteId) -> bool {
        match self {
            Placement::Replicated => true,
            Placement::Single(owner) => *owner == site,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_variables_are_replicated() {
        let placement = VariableId::new(4).placement(10);
        assert_eq!(placement, Placement::Replicated);
        assert_eq!(placement.sites(10).len(), 10);
        assert!(placement.includes(SiteId::new(7)));
    }

    #[test]
    fn test_odd_variables_have_one_owner() {
        assert_eq!(
            VariableId::new(1).placement(10),
            Placement::Single(SiteId::new(2))
        );
        assert_eq!(
            VariableId::new(9).placement(10),
            Placement::Single(SiteId::new(10))
        );
        assert_eq!(
            VariableId::new(11).placement(10),
            Placement::Single(SiteId::new(2))
        );

        let placement = VariableId::new(3).placement(10);
        assert_eq!(placement.sites(10), vec![SiteId::new(4)]);
        assert!(!placement.includes(SiteId::new(3)));
    }
}
