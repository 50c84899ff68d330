//! Navigable value accessors.
//!
//! A navigable maps one domain value of a collection (its owning key, element,
//! index or surrogate id) onto one or more physical columns. The order of
//! `columns()` is the order `dehydrate` emits values and the order the compiler
//! registers parameters; all three must agree.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::column::Column;
use crate::error::{PersistError, PersistResult};
use crate::value::{SqlValue, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigableRole {
    Key,
    Element,
    Index,
    Identifier,
}

impl fmt::Display for NavigableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigableRole::Key => "key",
            NavigableRole::Element => "element",
            NavigableRole::Index => "index",
            NavigableRole::Identifier => "identifier",
        };
        f.write_str(name)
    }
}

/// One column of a navigable. `path` locates the value inside a composite
/// domain value (`"id"`, `"address.city"`); scalar navigables have no path.
#[derive(Debug, Clone, Serialize)]
pub struct NavigablePart {
    pub column: Column,
    pub value_type: ValueType,
    pub path: Option<String>,
}

impl NavigablePart {
    pub fn new(column: Column, value_type: ValueType) -> Self {
        Self {
            column,
            value_type,
            path: None,
        }
    }

    pub fn at_path(column: Column, value_type: ValueType, path: impl Into<String>) -> Self {
        Self {
            column,
            value_type,
            path: Some(path.into()),
        }
    }
}

/// Domain value broken down to one scalar per column, still in domain form.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalForm(Vec<Value>);

impl RelationalForm {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(Value::is_null)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Navigable {
    role: NavigableRole,
    parts: Vec<NavigablePart>,
}

impl Navigable {
    pub fn new(role: NavigableRole, parts: Vec<NavigablePart>) -> PersistResult<Self> {
        if parts.is_empty() {
            return Err(PersistError::configuration(format!(
                "{} navigable maps to no columns",
                role
            )));
        }
        if parts.len() > 1 && parts.iter().any(|p| p.path.is_none()) {
            return Err(PersistError::configuration(format!(
                "composite {} navigable needs a path for every column",
                role
            )));
        }
        for (i, part) in parts.iter().enumerate() {
            if parts[..i].iter().any(|p| p.column == part.column) {
                return Err(PersistError::configuration(format!(
                    "{} navigable maps column {} twice",
                    role, part.column
                )));
            }
        }
        Ok(Self { role, parts })
    }

    /// Single-column navigable
    pub fn basic(role: NavigableRole, column: Column, value_type: ValueType) -> Self {
        Self {
            role,
            parts: vec![NavigablePart::new(column, value_type)],
        }
    }

    pub fn role(&self) -> NavigableRole {
        self.role
    }

    pub fn parts(&self) -> &[NavigablePart] {
        &self.parts
    }

    pub fn columns(&self) -> Vec<(&Column, ValueType)> {
        self.parts.iter().map(|p| (&p.column, p.value_type)).collect()
    }

    pub fn column_count(&self) -> usize {
        self.parts.len()
    }

    pub fn has_formula(&self) -> bool {
        self.parts.iter().any(|p| p.column.is_formula())
    }

    pub fn is_pure_formula(&self) -> bool {
        self.parts.iter().all(|p| p.column.is_formula())
    }

    pub fn unresolve(&self, value: &Value) -> PersistResult<RelationalForm> {
        if value.is_null() {
            return Ok(RelationalForm(vec![Value::Null; self.parts.len()]));
        }
        let scalar_shortcut = self.parts.len() == 1 && !value.is_object();
        let mut values = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let extracted = match &part.path {
                None => value.clone(),
                Some(_) if scalar_shortcut => value.clone(),
                Some(path) => {
                    if !value.is_object() {
                        return Err(PersistError::conversion(format!(
                            "{} value {} is not an object with '{}'",
                            self.role, value, path
                        )));
                    }
                    field_at_path(value, path)
                }
            };
            values.push(extracted);
        }
        Ok(RelationalForm(values))
    }

    /// Stream one callback per column, in `columns()` order.
    pub fn dehydrate<F>(&self, form: &RelationalForm, mut emit: F) -> PersistResult<()>
    where
        F: FnMut(SqlValue, ValueType, &Column) -> PersistResult<()>,
    {
        if form.0.len() != self.parts.len() {
            return Err(PersistError::parameter(format!(
                "{} form has {} values for {} columns",
                self.role,
                form.0.len(),
                self.parts.len()
            )));
        }
        for (part, value) in self.parts.iter().zip(&form.0) {
            let sql = SqlValue::from_domain(value, part.value_type)?;
            emit(sql, part.value_type, &part.column)?;
        }
        Ok(())
    }

    /// Rebuild a domain value from result columns given in `columns()` order.
    pub fn hydrate(&self, values: &[SqlValue]) -> PersistResult<Value> {
        if values.len() != self.parts.len() {
            return Err(PersistError::conversion(format!(
                "{} expects {} columns, row has {}",
                self.role,
                self.parts.len(),
                values.len()
            )));
        }
        if self.parts.len() == 1 && self.parts[0].path.is_none() {
            return Ok(values[0].to_domain());
        }
        if values.iter().all(SqlValue::is_null) {
            return Ok(Value::Null);
        }
        let mut root = Value::Object(Map::new());
        for (part, value) in self.parts.iter().zip(values) {
            if let Some(path) = &part.path {
                set_field_at_path(&mut root, path, value.to_domain());
            }
        }
        Ok(root)
    }
}

fn field_at_path(value: &Value, path: &str) -> Value {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn set_field_at_path(root: &mut Value, path: &str, leaf: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            _ => return,
        };
        if i + 1 == segments.len() {
            map.insert(segment.to_string(), leaf);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
