//! Read-only queries against stored collection rows.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{bind_index, query_rows, UnitOfWork};
use crate::binding::BindingContext;
use crate::error::{PersistError, PersistResult};
use crate::model::{CollectionDescriptor, SizeStrategy};
use crate::sql::{Clause, CollectionOperation, CompiledStatement, StatementCompiler};
use crate::value::SqlValue;

/// Element stored at one index, hydrated back into a domain value.
#[derive(Debug)]
pub struct RowByIndexSelector {
    descriptor: Arc<CollectionDescriptor>,
    select: CompiledStatement,
}

impl RowByIndexSelector {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let select = compiler.compile(&descriptor, CollectionOperation::SelectRowByIndex)?;
        Ok(Self { descriptor, select })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.select
    }

    /// `None` when no row sits at `index`.
    pub fn select(&self, key: &Value, index: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<Option<Value>> {
        let mut ctx = BindingContext::new();
        let rows = query_rows(uow, &self.select, &mut ctx, |ctx| {
            ctx.bind_navigable(&self.select, self.descriptor.key(), key, Clause::Restriction)?;
            bind_index(ctx, &self.select, &self.descriptor, index, Clause::Restriction)
        })?;
        match rows.first() {
            Some(row) => Ok(Some(self.descriptor.element().hydrate(row)?)),
            None => Ok(None),
        }
    }
}

/// Whether a row exists at an index (or surrogate id, for id-bags).
#[derive(Debug)]
pub struct IndexExistsSelector {
    descriptor: Arc<CollectionDescriptor>,
    select: CompiledStatement,
}

impl IndexExistsSelector {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let select = compiler.compile(&descriptor, CollectionOperation::RowExistsByIndex)?;
        Ok(Self { descriptor, select })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.select
    }

    pub fn exists(&self, key: &Value, index: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<bool> {
        let mut ctx = BindingContext::new();
        let rows = query_rows(uow, &self.select, &mut ctx, |ctx| {
            ctx.bind_navigable(&self.select, self.descriptor.key(), key, Clause::Restriction)?;
            match self.descriptor.identifier() {
                Some(id) => ctx.bind_navigable(&self.select, id, index, Clause::Restriction),
                None => bind_index(ctx, &self.select, &self.descriptor, index, Clause::Restriction),
            }
        })?;
        Ok(!rows.is_empty())
    }
}

#[derive(Debug)]
pub struct ElementExistsSelector {
    descriptor: Arc<CollectionDescriptor>,
    select: CompiledStatement,
}

impl ElementExistsSelector {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let select = compiler.compile(&descriptor, CollectionOperation::RowExistsByElement)?;
        Ok(Self { descriptor, select })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.select
    }

    pub fn exists(&self, key: &Value, element: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<bool> {
        let mut ctx = BindingContext::new();
        let rows = query_rows(uow, &self.select, &mut ctx, |ctx| {
            ctx.bind_navigable(&self.select, self.descriptor.key(), key, Clause::Restriction)?;
            ctx.bind_navigable(&self.select, self.descriptor.element(), element, Clause::Restriction)
        })?;
        Ok(!rows.is_empty())
    }
}

/// Number of stored entries for one key.
///
/// Ordinal lists compute `max(index) + 1` and subtract the base index; every
/// other collection counts rows. An empty result (SQL NULL) is size 0.
#[derive(Debug)]
pub struct SizeSelector {
    descriptor: Arc<CollectionDescriptor>,
    select: CompiledStatement,
}

impl SizeSelector {
    pub fn new(descriptor: Arc<CollectionDescriptor>, compiler: &StatementCompiler) -> PersistResult<Self> {
        let select = compiler.compile(&descriptor, CollectionOperation::Size)?;
        Ok(Self { descriptor, select })
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.select
    }

    pub fn size(&self, key: &Value, uow: &mut dyn UnitOfWork) -> PersistResult<usize> {
        let mut ctx = BindingContext::new();
        let rows = query_rows(uow, &self.select, &mut ctx, |ctx| {
            ctx.bind_navigable(&self.select, self.descriptor.key(), key, Clause::Restriction)
        })?;

        let raw = match rows.first().and_then(|row| row.first()) {
            None | Some(SqlValue::Null) => return Ok(0),
            Some(value) => value.as_i64().ok_or_else(|| {
                PersistError::conversion(format!(
                    "size query of {} returned {}",
                    self.descriptor.role(),
                    value
                ))
            })?,
        };
        let size = match self.descriptor.profile().size_strategy() {
            SizeStrategy::MaxIndex => raw - self.descriptor.base_index(),
            SizeStrategy::Count => raw,
        };
        debug!("Size of {}#{}: {}", self.descriptor.role(), key, size);
        Ok(size.max(0) as usize)
    }
}
