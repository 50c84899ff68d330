//! Startup registry of collection persisters.
//!
//! Every persister is built (and therefore every statement compiled) when the
//! registry is created. A mapping error in any collection fails the whole
//! build.

use colpersist_core::{CollectionDescriptor, CollectionPersister, StatementCompiler};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MappingConfig;
use crate::error::{MappingError, MappingResult};

#[derive(Debug)]
pub struct MappingRegistry {
    compiler: StatementCompiler,
    persisters: BTreeMap<String, CollectionPersister>,
}

impl MappingRegistry {
    pub fn build(config: &MappingConfig) -> MappingResult<Self> {
        Self::from_descriptors(config.descriptors()?, config.compiler())
    }

    pub fn from_descriptors(
        descriptors: Vec<CollectionDescriptor>,
        compiler: StatementCompiler,
    ) -> MappingResult<Self> {
        let mut persisters = BTreeMap::new();
        for descriptor in descriptors {
            let role = descriptor.role().to_string();
            if persisters.contains_key(&role) {
                return Err(MappingError::invalid(format!(
                    "collection role '{}' is mapped twice",
                    role
                )));
            }
            let persister = CollectionPersister::new(Arc::new(descriptor), &compiler)?;
            for reason in persister.unsupported_operations() {
                warn!("{}: {}", role, reason);
            }
            persisters.insert(role, persister);
        }

        let registry = Self {
            compiler,
            persisters,
        };
        info!(
            "Built {} collection persisters ({} statements)",
            registry.len(),
            registry.statement_count()
        );
        Ok(registry)
    }

    pub fn compiler(&self) -> &StatementCompiler {
        &self.compiler
    }

    pub fn get(&self, role: &str) -> MappingResult<&CollectionPersister> {
        self.persisters
            .get(role)
            .ok_or_else(|| MappingError::UnknownRole(role.to_string()))
    }

    /// Roles in sorted order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.persisters.keys().map(String::as_str)
    }

    pub fn persisters(&self) -> impl Iterator<Item = &CollectionPersister> {
        self.persisters.values()
    }

    pub fn len(&self) -> usize {
        self.persisters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisters.is_empty()
    }

    pub fn statement_count(&self) -> usize {
        self.persisters.values().map(|p| p.statements().len()).sum()
    }
}
