use serde::Serialize;
use std::fmt;

use super::ast::{Expression, Statement};
use super::compiler::CollectionOperation;
use crate::error::{PersistError, PersistResult};
use crate::model::Column;
use crate::value::ValueType;

/// Part of a statement a parameter belongs to. The same column may appear once
/// per clause (e.g. `set elem = ? where elem = ?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Clause {
    Values,
    Assignment,
    Restriction,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Values => f.write_str("values"),
            Clause::Assignment => f.write_str("set"),
            Clause::Restriction => f.write_str("where"),
        }
    }
}

/// 0-based position of a parameter in compile (and render) order
pub type ParameterSlot = usize;

#[derive(Debug, Clone, Serialize)]
pub struct JdbcParameter {
    pub slot: ParameterSlot,
    pub column: Column,
    pub clause: Clause,
    pub value_type: ValueType,
}

/// Accumulates parameters while an AST is being built. Consumed by `finish`,
/// so the association can never be mutated after compilation.
#[derive(Debug, Default)]
pub struct ParameterListBuilder {
    parameters: Vec<JdbcParameter>,
}

impl ParameterListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        column: &Column,
        clause: Clause,
        value_type: ValueType,
    ) -> PersistResult<Expression> {
        if self
            .parameters
            .iter()
            .any(|p| p.clause == clause && &p.column == column)
        {
            return Err(PersistError::configuration(format!(
                "column {} registered twice in {} clause",
                column, clause
            )));
        }
        let slot = self.parameters.len();
        self.parameters.push(JdbcParameter {
            slot,
            column: column.clone(),
            clause,
            value_type,
        });
        Ok(Expression::Parameter(slot))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn finish(self) -> Vec<JdbcParameter> {
        self.parameters
    }
}

/// Immutable, backend-ready statement. Holds no per-execution state and can be
/// shared freely between units of work.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    role: String,
    operation: CollectionOperation,
    sql: String,
    statement: Statement,
    parameters: Vec<JdbcParameter>,
}

impl CompiledStatement {
    pub(crate) fn new(
        role: String,
        operation: CollectionOperation,
        sql: String,
        statement: Statement,
        parameters: Vec<JdbcParameter>,
    ) -> Self {
        Self {
            role,
            operation,
            sql,
            statement,
            parameters,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn operation(&self) -> CollectionOperation {
        self.operation
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Parameters in slot order
    pub fn parameters(&self) -> &[JdbcParameter] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_for(&self, column: &Column, clause: Clause) -> PersistResult<&JdbcParameter> {
        self.parameters
            .iter()
            .find(|p| p.clause == clause && &p.column == column)
            .ok_or_else(|| {
                PersistError::parameter(format!(
                    "no {} parameter for column {} in {} statement of {}",
                    clause, column, self.operation, self.role
                ))
            })
    }

    pub fn has_parameter(&self, column: &Column, clause: Clause) -> bool {
        self.parameters
            .iter()
            .any(|p| p.clause == clause && &p.column == column)
    }

    /// Columns bound in `clause`, in slot order
    pub fn columns_in(&self, clause: Clause) -> Vec<&Column> {
        self.parameters
            .iter()
            .filter(|p| p.clause == clause)
            .map(|p| &p.column)
            .collect()
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
