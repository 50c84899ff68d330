use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{execute_row, UnitOfWork};
use crate::binding::BindingContext;
use crate::error::{PersistError, PersistResult};
use crate::model::CollectionDescriptor;
use crate::sql::{Clause, CollectionOperation, CompiledStatement, StatementCompiler};

/// Removes every row of one owning key. For owned tables the rows are kept
/// and their foreign key is cleared.
#[derive(Debug)]
pub struct CollectionRemovalExecutor {
    descriptor: Arc<CollectionDescriptor>,
    delete_all: CompiledStatement,
}

impl CollectionRemovalExecutor {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let delete_all = compiler.compile(&descriptor, CollectionOperation::DeleteAll)?;
        Ok(Self {
            descriptor,
            delete_all,
        })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.delete_all
    }

    /// Returns the affected row count reported by the unit of work.
    pub fn remove(&self, key: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<u64> {
        if key.is_null() {
            return Err(PersistError::NullKey(self.descriptor.role().to_string()));
        }
        debug!("Deleting collection: {}#{}", self.descriptor.role(), key);

        let mut ctx = BindingContext::new();
        let affected = execute_row(uow, &self.delete_all, &mut ctx, |ctx| {
            ctx.bind_navigable(&self.delete_all, self.descriptor.key(), key, Clause::Restriction)
        })?;
        debug!("Done deleting collection: {} rows", affected);
        Ok(affected)
    }
}
