//! Variable store for one site

use crate::variable::Variable;
use repdb_common::{EngineConfig, SiteId, VariableId};
use std::collections::BTreeMap;

/// The copies held by a single site
#[derive(Debug, Clone)]
pub struct VariableStore {
    variables: BTreeMap<VariableId, Variable>,
}

impl VariableStore {
    /// Populate the store with every variable placed on `site`
    pub fn for_site(site: SiteId, config: &EngineConfig) -> Self {
        let variables = config
            .variables()
            .filter(|var| var.placement(config.site_count).includes(site))
            .map(|var| (var, Variable::new(var)))
            .collect();

        Self { variables }
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(&id)
    }

    pub fn contains(&self, id: VariableId) -> bool {
        self.variables.contains_key(&id)
    }

    /// Iterate in variable order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Block ordinary reads of every replicated copy
    pub fn mark_replicated_unreadable(&mut self) {
        for var in self.variables.values_mut() {
            if var.id().is_replicated() {
                var.mark_unreadable();
            }
        }
    }
}
