use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{PersistError, PersistResult};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid identifier regex")
});

/// Reject anything that would need quoting when rendered into SQL.
pub fn validate_identifier(kind: &str, name: &str) -> PersistResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(PersistError::configuration(format!(
            "invalid {} name '{}'",
            kind, name
        )))
    }
}

/// Physical table, optionally schema-qualified (`schema.table`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Table {
    name: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> PersistResult<Self> {
        let name = name.into();
        validate_identifier("table", &name)?;
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Physical,
    /// Read-only expression; never assigned or inserted.
    Formula,
}

/// A column of a collection table. Identity is table + name; for formulas the
/// name is the formula text.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    table: String,
    name: String,
    kind: ColumnKind,
}

impl Column {
    pub fn physical(table: &Table, name: impl Into<String>) -> PersistResult<Self> {
        let name = name.into();
        validate_identifier("column", &name)?;
        Ok(Self {
            table: table.name().to_string(),
            name,
            kind: ColumnKind::Physical,
        })
    }

    pub fn formula(table: &Table, expression: impl Into<String>) -> PersistResult<Self> {
        let expression = expression.into();
        if expression.trim().is_empty() || expression.contains(';') {
            return Err(PersistError::configuration(format!(
                "invalid formula '{}' on table {}",
                expression, table
            )));
        }
        Ok(Self {
            table: table.name().to_string(),
            name: expression,
            kind: ColumnKind::Formula,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn is_formula(&self) -> bool {
        self.kind == ColumnKind::Formula
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ColumnKind::Physical => write!(f, "{}.{}", self.table, self.name),
            ColumnKind::Formula => write!(f, "{}.({})", self.table, self.name),
        }
    }
}
