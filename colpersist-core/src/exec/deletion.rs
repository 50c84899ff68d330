use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{bind_row_identity, execute_row, resolve_key, RowAddress, UnitOfWork};
use crate::binding::BindingContext;
use crate::change_set::PersistentCollection;
use crate::error::PersistResult;
use crate::model::{CollectionDescriptor, RowIdentity};
use crate::sql::{CollectionOperation, CompiledStatement, StatementCompiler};

/// Deletes the rows of entries that left a join-table collection.
///
/// Owned tables have no row delete: building this executor for one fails with
/// `UnsupportedStrategy`, and their removed rows are detached by
/// [`OneToManyRowsUpdateExecutor`](super::OneToManyRowsUpdateExecutor).
#[derive(Debug)]
pub struct JoinTableRowsDeletionExecutor {
    descriptor: Arc<CollectionDescriptor>,
    delete: CompiledStatement,
}

impl JoinTableRowsDeletionExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let delete = compiler.compile(&descriptor, CollectionOperation::DeleteRow)?;
        Ok(Self { descriptor, delete })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.delete
    }

    pub fn execute(
        &self,
        collection: &dyn PersistentCollection,
        key: Option<&Value>,
        uow: &mut dyn UnitOfWork,
    ) -> PersistResult<usize> {
        let key = resolve_key(&self.descriptor, key, collection.recorded_key())?;
        debug!("Deleting rows of collection: {}#{}", self.descriptor.role(), key);

        let profile = self.descriptor.profile();
        let deletes = collection.deletes(profile.deletes_by_index());

        let mut ctx = BindingContext::new();
        for deleted in &deletes {
            let address = match profile.row_identity() {
                RowIdentity::SurrogateId => RowAddress::Identifier(deleted),
                RowIdentity::KeyAndIndex => RowAddress::Index(deleted),
                RowIdentity::KeyAndElement => RowAddress::Element(deleted),
            };
            execute_row(uow, &self.delete, &mut ctx, |ctx| {
                bind_row_identity(ctx, &self.delete, &self.descriptor, &key, address)
            })?;
        }
        debug!("Done deleting collection rows: {} deleted", deletes.len());
        Ok(deletes.len())
    }
}
