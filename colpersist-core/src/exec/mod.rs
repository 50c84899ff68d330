//! Executors: run compiled statements for one collection against a unit of work.
//!
//! Every executor compiles its statements once when it is built and afterwards
//! only binds and executes. Rows are written one at a time in the order the
//! executor defines; a fresh [`BindingContext`] is used per call and cleared
//! after every row.

mod creation;
mod deletion;
mod persister;
mod removal;
mod selector;
mod update;

pub use creation::{CollectionCreationExecutor, RowInsertionExecutor};
pub use deletion::JoinTableRowsDeletionExecutor;
pub use persister::{CollectionPersister, FlushStats};
pub use removal::CollectionRemovalExecutor;
pub use selector::{ElementExistsSelector, IndexExistsSelector, RowByIndexSelector, SizeSelector};
pub use update::{JoinTableRowsUpdateExecutor, OneToManyRowsUpdateExecutor, RowUpdateCounts, RowsUpdateExecutor};

use serde_json::Value;

use crate::binding::BindingContext;
use crate::error::{BackendError, PersistError, PersistResult};
use crate::model::CollectionDescriptor;
use crate::sql::{Clause, CompiledStatement};
use crate::value::SqlValue;

/// Execution primitive. Implementations own the connection; executors hand
/// them one statement and its parameter values in slot order at a time.
pub trait UnitOfWork {
    /// Returns the affected row count.
    fn execute_update(
        &mut self,
        statement: &CompiledStatement,
        params: &[SqlValue],
    ) -> Result<u64, BackendError>;

    fn execute_query(
        &mut self,
        statement: &CompiledStatement,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, BackendError>;
}

/// Owning key to bind: the explicit one, else the collection's recorded key.
pub(crate) fn resolve_key(
    descriptor: &CollectionDescriptor,
    explicit: Option<&Value>,
    recorded: Option<&Value>,
) -> PersistResult<Value> {
    match explicit.or(recorded) {
        Some(key) if !key.is_null() => Ok(key.clone()),
        _ => Err(PersistError::NullKey(descriptor.role().to_string())),
    }
}

/// Bind through `bind`, execute, clear. The context is cleared on every path.
pub(crate) fn execute_row<F>(
    uow: &mut dyn UnitOfWork,
    statement: &CompiledStatement,
    ctx: &mut BindingContext,
    bind: F,
) -> PersistResult<u64>
where
    F: FnOnce(&mut BindingContext) -> PersistResult<()>,
{
    let outcome = bind(ctx)
        .and_then(|()| ctx.parameter_values(statement))
        .and_then(|params| {
            uow.execute_update(statement, &params)
                .map_err(|source| execution_error(statement, source))
        });
    ctx.clear();
    outcome
}

pub(crate) fn query_rows<F>(
    uow: &mut dyn UnitOfWork,
    statement: &CompiledStatement,
    ctx: &mut BindingContext,
    bind: F,
) -> PersistResult<Vec<Vec<SqlValue>>>
where
    F: FnOnce(&mut BindingContext) -> PersistResult<()>,
{
    let outcome = bind(ctx)
        .and_then(|()| ctx.parameter_values(statement))
        .and_then(|params| {
            uow.execute_query(statement, &params)
                .map_err(|source| execution_error(statement, source))
        });
    ctx.clear();
    outcome
}

fn execution_error(statement: &CompiledStatement, source: BackendError) -> PersistError {
    PersistError::Execution {
        sql: statement.sql().to_string(),
        source,
    }
}

/// Bind an in-memory index, shifted to its stored form.
pub(crate) fn bind_index(
    ctx: &mut BindingContext,
    statement: &CompiledStatement,
    descriptor: &CollectionDescriptor,
    index: &Value,
    clause: Clause,
) -> PersistResult<()> {
    let navigable = descriptor.index().ok_or_else(|| {
        PersistError::configuration(format!("{}: collection has no index", descriptor.role()))
    })?;
    let stored = descriptor.index_to_stored(index)?;
    ctx.bind_navigable(statement, navigable, &stored, clause)
}

/// Bind the columns that identify one existing row, following the row
/// identity precedence of the descriptor.
pub(crate) fn bind_row_identity(
    ctx: &mut BindingContext,
    statement: &CompiledStatement,
    descriptor: &CollectionDescriptor,
    key: &Value,
    row: RowAddress<'_>,
) -> PersistResult<()> {
    match row {
        RowAddress::Identifier(id) => {
            let navigable = descriptor.identifier().ok_or_else(|| {
                PersistError::configuration(format!("{}: collection has no identifier", descriptor.role()))
            })?;
            ctx.bind_navigable(statement, navigable, id, Clause::Restriction)
        }
        RowAddress::Index(index) => {
            ctx.bind_navigable(statement, descriptor.key(), key, Clause::Restriction)?;
            bind_index(ctx, statement, descriptor, index, Clause::Restriction)
        }
        RowAddress::Element(element) => {
            ctx.bind_navigable(statement, descriptor.key(), key, Clause::Restriction)?;
            ctx.bind_navigable(statement, descriptor.element(), element, Clause::Restriction)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum RowAddress<'a> {
    Identifier(&'a Value),
    Index(&'a Value),
    Element(&'a Value),
}

/// Executor slot that may be unavailable for a strategy combination. The
/// reason is kept and reported each time the executor is asked for.
#[derive(Debug)]
pub(crate) enum Capability<T> {
    Ready(T),
    Unsupported(String),
    NotApplicable(String),
}

impl<T> Capability<T> {
    /// Unsupported combinations are kept; every other error is fatal.
    pub(crate) fn from_result(result: PersistResult<T>) -> PersistResult<Self> {
        match result {
            Ok(executor) => Ok(Capability::Ready(executor)),
            Err(PersistError::UnsupportedStrategy(reason)) => Ok(Capability::Unsupported(reason)),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn get(&self) -> PersistResult<&T> {
        match self {
            Capability::Ready(executor) => Ok(executor),
            Capability::Unsupported(reason) => Err(PersistError::unsupported(reason.clone())),
            Capability::NotApplicable(reason) => Err(PersistError::configuration(reason.clone())),
        }
    }

    pub(crate) fn ready(&self) -> Option<&T> {
        match self {
            Capability::Ready(executor) => Some(executor),
            _ => None,
        }
    }
}
