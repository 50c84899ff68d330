//! Per-row parameter bindings.
//!
//! A [`BindingContext`] collects the values for one execution of one compiled
//! statement. Executors fill it, read it back in slot order and clear it after
//! every row, whether the row succeeded or not.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{PersistError, PersistResult};
use crate::model::{Column, Navigable};
use crate::sql::{Clause, CompiledStatement, ParameterSlot};
use crate::value::{SqlValue, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: SqlValue,
    pub value_type: ValueType,
    pub clause: Clause,
}

#[derive(Debug, Default)]
pub struct BindingContext {
    bindings: BTreeMap<ParameterSlot, Binding>,
}

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to the slot registered for (`column`, `clause`).
    pub fn bind(
        &mut self,
        statement: &CompiledStatement,
        column: &Column,
        clause: Clause,
        value: SqlValue,
        value_type: ValueType,
    ) -> PersistResult<()> {
        let parameter = statement.parameter_for(column, clause)?;
        if parameter.value_type != value_type {
            return Err(PersistError::parameter(format!(
                "column {} expects {}, got {}",
                column, parameter.value_type, value_type
            )));
        }
        self.bindings.insert(
            parameter.slot,
            Binding {
                value,
                value_type,
                clause,
            },
        );
        Ok(())
    }

    /// Decompose a domain value through `navigable` and bind every column of it.
    /// Formula columns only exist as restrictions and are skipped elsewhere.
    pub fn bind_navigable(
        &mut self,
        statement: &CompiledStatement,
        navigable: &Navigable,
        value: &Value,
        clause: Clause,
    ) -> PersistResult<()> {
        let form = navigable.unresolve(value)?;
        navigable.dehydrate(&form, |sql_value, value_type, column| {
            if column.is_formula() && clause != Clause::Restriction {
                return Ok(());
            }
            self.bind(statement, column, clause, sql_value, value_type)
        })
    }

    pub fn get(&self, slot: ParameterSlot) -> Option<&Binding> {
        self.bindings.get(&slot)
    }

    /// Values in slot order. Every registered slot must be bound.
    pub fn parameter_values(&self, statement: &CompiledStatement) -> PersistResult<Vec<SqlValue>> {
        statement
            .parameters()
            .iter()
            .map(|p| {
                self.bindings
                    .get(&p.slot)
                    .map(|b| b.value.clone())
                    .ok_or_else(|| {
                        PersistError::parameter(format!(
                            "slot {} ({} {}) left unbound in {}",
                            p.slot,
                            p.clause,
                            p.column,
                            statement.sql()
                        ))
                    })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
