use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::creation::{bind_insert, RowValues};
use super::{bind_index, bind_row_identity, execute_row, resolve_key, RowAddress, UnitOfWork};
use crate::binding::BindingContext;
use crate::change_set::{EntryRef, PersistentCollection};
use crate::error::{PersistError, PersistResult};
use crate::model::{CollectionDescriptor, RowIdentity, StorageStrategy};
use crate::sql::{Clause, CollectionOperation, CompiledStatement, StatementCompiler};

/// Rows touched by one update pass. Only owned tables detach rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowUpdateCounts {
    pub detached: usize,
    pub updated: usize,
}

#[derive(Debug)]
pub enum RowsUpdateExecutor {
    JoinTable(JoinTableRowsUpdateExecutor),
    OneToMany(OneToManyRowsUpdateExecutor),
}

impl RowsUpdateExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        match descriptor.storage() {
            StorageStrategy::JoinTable => Ok(RowsUpdateExecutor::JoinTable(
                JoinTableRowsUpdateExecutor::new(descriptor, compiler)?,
            )),
            StorageStrategy::OwnedTable => Ok(RowsUpdateExecutor::OneToMany(
                OneToManyRowsUpdateExecutor::new(descriptor, compiler)?,
            )),
        }
    }

    pub fn execute(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<RowUpdateCounts> {
        match self {
            RowsUpdateExecutor::JoinTable(executor) => Ok(RowUpdateCounts {
                detached: 0,
                updated: executor.execute(collection, key, uow)?,
            }),
            RowsUpdateExecutor::OneToMany(executor) => executor.execute(collection, key, uow),
        }
    }

    pub fn statements(&self) -> Vec<&CompiledStatement> {
        match self {
            RowsUpdateExecutor::JoinTable(executor) => vec![executor.statement()],
            RowsUpdateExecutor::OneToMany(executor) => executor.statements(),
        }
    }
}

/// Rewrites changed rows of a join table in place.
#[derive(Debug)]
pub struct JoinTableRowsUpdateExecutor {
    descriptor: Arc<CollectionDescriptor>,
    update: CompiledStatement,
}

impl JoinTableRowsUpdateExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let update = compiler.compile(&descriptor, CollectionOperation::UpdateRow)?;
        Ok(Self { descriptor, update })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.update
    }

    pub fn execute(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        debug!("Updating rows of collection: {}#{}", self.descriptor.role(), key);

        let mut entries = collection.entries();
        // Renumbering after a removal must start from the tail so no row
        // briefly takes the index of a row that has not moved yet.
        if collection.element_removed() {
            entries.reverse();
        }

        let mut ctx = BindingContext::new();
        let mut count = 0;
        for entry in entries {
            if !collection.needs_updating(entry) {
                continue;
            }
            execute_row(uow, &self.update, &mut ctx, |ctx| {
                self.bind_update(ctx, collection, entry, &key)
            })?;
            count += 1;
        }
        debug!("Done updating rows: {} updated", count);
        Ok(count)
    }

    fn bind_update(
        &self,
        ctx: &mut BindingContext,
        collection: &dyn PersistentCollection,
        entry: EntryRef,
        key: &Value,
    ) -> PersistResult<()> {
        let descriptor = &*self.descriptor;
        let statement = &self.update;
        let index = collection.index_for(entry);

        ctx.bind_navigable(statement, descriptor.element(), collection.element_for(entry), Clause::Assignment)?;
        if descriptor.profile().index_assignable() {
            if let Some(index) = &index {
                bind_index(ctx, statement, descriptor, index, Clause::Assignment)?;
            }
        }

        let address = match descriptor.profile().row_identity() {
            RowIdentity::SurrogateId => RowAddress::Identifier(
                collection.identifier_for(entry).ok_or_else(|| missing(descriptor, "identifier"))?,
            ),
            RowIdentity::KeyAndIndex => {
                RowAddress::Index(index.as_ref().ok_or_else(|| missing(descriptor, "index"))?)
            }
            // the row still holds the old element
            RowIdentity::KeyAndElement => RowAddress::Element(
                collection
                    .snapshot_element_at(entry)
                    .unwrap_or_else(|| collection.element_for(entry)),
            ),
        };
        bind_row_identity(ctx, statement, descriptor, key, address)
    }
}

fn missing(descriptor: &CollectionDescriptor, what: &str) -> PersistError {
    PersistError::configuration(format!("{}: entry has no {}", descriptor.role(), what))
}

/// Update for owned tables. The delete phase detaches the rows that left the
/// collection or changed position; the insert phase attaches the current
/// element of every changed entry. Either phase may be disabled by the mapping.
#[derive(Debug)]
pub struct OneToManyRowsUpdateExecutor {
    descriptor: Arc<CollectionDescriptor>,
    detach: Option<CompiledStatement>,
    attach: Option<CompiledStatement>,
}

impl OneToManyRowsUpdateExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let detach = if descriptor.row_delete_enabled() {
            Some(compiler.compile(&descriptor, CollectionOperation::DetachRow)?)
        } else {
            None
        };
        let attach = if descriptor.row_insert_enabled() {
            Some(compiler.compile(&descriptor, CollectionOperation::UpdateRow)?)
        } else {
            None
        };
        Ok(Self {
            descriptor,
            detach,
            attach,
        })
    }

    pub fn statements(&self) -> Vec<&CompiledStatement> {
        self.detach.iter().chain(self.attach.iter()).collect()
    }

    pub fn execute(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<RowUpdateCounts> {
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        debug!("Updating one-to-many rows: {}#{}", self.descriptor.role(), key);

        let mut counts = RowUpdateCounts::default();
        if let Some(detach) = &self.detach {
            counts.detached = self.delete_phase(detach, collection, &key, uow)?;
        }
        if let Some(attach) = &self.attach {
            counts.updated = self.insert_phase(attach, collection, &key, uow)?;
        }
        debug!(
            "Done updating one-to-many rows: {} detached, {} attached",
            counts.detached, counts.updated
        );
        Ok(counts)
    }

    fn delete_phase(
        &self,
        detach: &CompiledStatement,
        collection: &dyn PersistentCollection,
        key: &Value,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let mut stale: Vec<Value> = collection.deletes(false);
        for entry in collection.entries() {
            if collection.needs_updating(entry) {
                if let Some(previous) = collection.snapshot_element_at(entry) {
                    stale.push(previous.clone());
                }
            }
        }

        let mut ctx = BindingContext::new();
        for element in &stale {
            execute_row(uow, detach, &mut ctx, |ctx| {
                bind_row_identity(ctx, detach, &self.descriptor, key, RowAddress::Element(element))
            })?;
        }
        Ok(stale.len())
    }

    fn insert_phase(
        &self,
        attach: &CompiledStatement,
        collection: &dyn PersistentCollection,
        key: &Value,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let mut ctx = BindingContext::new();
        let mut count = 0;
        for entry in collection.entries() {
            if !collection.needs_updating(entry) {
                continue;
            }
            let index = collection.index_for(entry);
            let row = RowValues {
                key,
                identifier: None,
                index: index.as_ref(),
                element: collection.element_for(entry),
            };
            execute_row(uow, attach, &mut ctx, |ctx| {
                bind_insert(ctx, attach, &self.descriptor, &row)
            })?;
            count += 1;
        }
        Ok(count)
    }
}
