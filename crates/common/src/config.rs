//! Engine configuration

use crate::{SiteId, VariableId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration the engine cannot run with
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one site is required")]
    NoSites,

    #[error("at least one variable is required")]
    NoVariables,
}

/// Size of the simulated cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of sites, numbered `1..=site_count`
    pub site_count: u32,

    /// Number of variables, numbered `1..=variable_count`
    pub variable_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            site_count: 10,
            variable_count: 20,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of sites
    pub fn with_site_count(mut self, count: u32) -> Self {
        self.site_count = count;
        self
    }

    /// Set the number of variables
    pub fn with_variable_count(mut self, count: u32) -> Self {
        self.variable_count = count;
        self
    }

    /// Check that the cluster has somewhere to place every variable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_count == 0 {
            return Err(ConfigError::NoSites);
        }
        if self.variable_count == 0 {
            return Err(ConfigError::NoVariables);
        }
        Ok(())
    }

    pub fn contains_site(&self, site: SiteId) -> bool {
        (1..=self.site_count).contains(&site.get())
    }

    pub fn contains_variable(&self, variable: VariableId) -> bool {
        (1..=self.variable_count).contains(&variable.index())
    }

    /// All variable ids in ascending order
    pub fn variables(&self) -> impl Iterator<Item = VariableId> {
        (1..=self.variable_count).map(VariableId::new)
    }
}
