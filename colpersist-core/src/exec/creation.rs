use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{execute_row, resolve_key, UnitOfWork};
use crate::binding::BindingContext;
use crate::change_set::{EntryRef, IdentifierSource, PersistentCollection};
use crate::error::PersistResult;
use crate::model::{CollectionDescriptor, StorageStrategy};
use crate::sql::{Clause, CollectionOperation, CompiledStatement, StatementCompiler};

/// Values of one row to write.
pub(crate) struct RowValues<'a> {
    pub key: &'a Value,
    pub identifier: Option<&'a Value>,
    pub index: Option<&'a Value>,
    pub element: &'a Value,
}

/// Bind a row to the insert-row statement. Join tables take every value in
/// the VALUES list; owned tables receive key and index as assignments on the
/// element's existing row.
pub(crate) fn bind_insert(
    ctx: &mut BindingContext,
    statement: &CompiledStatement,
    descriptor: &CollectionDescriptor,
    row: &RowValues<'_>,
) -> PersistResult<()> {
    let (write_clause, element_clause) = match descriptor.storage() {
        StorageStrategy::JoinTable => (Clause::Values, Clause::Values),
        StorageStrategy::OwnedTable => (Clause::Assignment, Clause::Restriction),
    };
    ctx.bind_navigable(statement, descriptor.key(), row.key, write_clause)?;
    if let Some(navigable) = descriptor.identifier() {
        ctx.bind_navigable(
            statement,
            navigable,
            row.identifier.unwrap_or(&Value::Null),
            write_clause,
        )?;
    }
    if let (Some(navigable), Some(index)) = (descriptor.index(), row.index) {
        if !navigable.is_pure_formula() {
            let stored = descriptor.index_to_stored(index)?;
            ctx.bind_navigable(statement, navigable, &stored, write_clause)?;
        }
    }
    ctx.bind_navigable(statement, descriptor.element(), row.element, element_clause)
}

fn insert_entry(
    descriptor: &CollectionDescriptor,
    statement: &CompiledStatement,
    collection: &dyn PersistentCollection,
    entry: EntryRef,
    key: &Value,
    uow: &mut dyn UnitOfWork,
    ctx: &mut BindingContext,
) -> PersistResult<u64> {
    let index = collection.index_for(entry);
    let row = RowValues {
        key,
        identifier: collection.identifier_for(entry),
        index: index.as_ref(),
        element: collection.element_for(entry),
    };
    execute_row(uow, statement, ctx, |ctx| {
        bind_insert(ctx, statement, descriptor, &row)
    })
}

/// Writes every entry of a collection that has no rows yet.
#[derive(Debug)]
pub struct CollectionCreationExecutor {
    descriptor: Arc<CollectionDescriptor>,
    insert: CompiledStatement,
}

impl CollectionCreationExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let insert = compiler.compile(&descriptor, CollectionOperation::InsertRow)?;
        Ok(Self { descriptor, insert })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.insert
    }

    /// Returns the number of rows written.
    pub fn create(
        &self,
        collection: &mut dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        debug!("Inserting collection: {}#{}", self.descriptor.role(), key);

        let entries = collection.entries();
        if entries.is_empty() {
            debug!("Collection was empty");
            return Ok(0);
        }

        let ids = self.descriptor.identifier_generator().map(|g| g as &dyn IdentifierSource);
        collection.pre_insert(ids);

        let mut ctx = BindingContext::new();
        let mut count = 0;
        for entry in entries {
            if !collection.entry_exists(entry) {
                continue;
            }
            insert_entry(&self.descriptor, &self.insert, &*collection, entry, &key, uow, &mut ctx)?;
            collection.after_row_insert(entry);
            count += 1;
        }
        debug!("Done inserting collection: {} rows inserted", count);
        Ok(count)
    }
}

/// Writes only the entries added since the last flush.
#[derive(Debug)]
pub struct RowInsertionExecutor {
    descriptor: Arc<CollectionDescriptor>,
    insert: CompiledStatement,
}

impl RowInsertionExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let insert = compiler.compile(&descriptor, CollectionOperation::InsertRow)?;
        Ok(Self { descriptor, insert })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.insert
    }

    pub fn execute(
        &self,
        collection: &mut dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        debug!("Inserting rows of collection: {}#{}", self.descriptor.role(), key);

        let ids = self.descriptor.identifier_generator().map(|g| g as &dyn IdentifierSource);
        collection.pre_insert(ids);

        let mut ctx = BindingContext::new();
        let mut count = 0;
        for entry in collection.entries() {
            if !collection.needs_inserting(entry) {
                continue;
            }
            insert_entry(&self.descriptor, &self.insert, &*collection, entry, &key, uow, &mut ctx)?;
            collection.after_row_insert(entry);
            count += 1;
        }
        debug!("Done inserting rows: {} inserted", count);
        Ok(count)
    }

    /// Write queued additions of a collection that was never read. Ordinal
    /// indices continue from `next_index`.
    pub fn insert_queued(
        &self,
        additions: &[Value],
        key: &Value,
        next_index: usize,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let ordinal = self.descriptor.is_ordinal_indexed();
        let mut ctx = BindingContext::new();
        for (offset, element) in additions.iter().enumerate() {
            let identifier = self.descriptor.identifier_generator().map(|g| g.generate());
            let index = ordinal.then(|| Value::from((next_index + offset) as i64));
            let row = RowValues {
                key,
                identifier: identifier.as_ref(),
                index: index.as_ref(),
                element,
            };
            execute_row(uow, &self.insert, &mut ctx, |ctx| {
                bind_insert(ctx, &self.insert, &self.descriptor, &row)
            })?;
        }
        debug!("Done processing queued additions: {} inserted", additions.len());
        Ok(additions.len())
    }
}
