//! Relational values.
//!
//! Domain values are `serde_json::Value`; `SqlValue` is what actually gets bound
//! to a statement parameter or read back from a result row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{PersistError, PersistResult};

/// Bindable type of a physical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "integer",
            ValueType::Real => "real",
            ValueType::Text => "text",
            ValueType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(n) => Some(*n),
            SqlValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Convert a domain value into the relational form required by `value_type`.
    pub fn from_domain(value: &Value, value_type: ValueType) -> PersistResult<Self> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let converted = match value_type {
            ValueType::Integer => value.as_i64().map(SqlValue::Integer),
            ValueType::Real => value.as_f64().map(SqlValue::Real),
            ValueType::Text => value.as_str().map(|s| SqlValue::Text(s.to_string())),
            ValueType::Boolean => value.as_bool().map(SqlValue::Boolean),
        };
        converted.ok_or_else(|| {
            PersistError::conversion(format!("cannot bind {} as {}", value, value_type))
        })
    }

    pub fn to_domain(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(n) => Value::from(*n),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Boolean(b) => Value::Bool(*b),
        }
    }

    /// SQL comparison: NULL never compares equal to anything.
    pub fn sql_eq(&self, other: &SqlValue) -> bool {
        matches!(self.compare(other), Some(Ordering::Equal))
    }

    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Null, _) | (_, SqlValue::Null) => None,
            (SqlValue::Integer(a), SqlValue::Integer(b)) => Some(a.cmp(b)),
            (SqlValue::Integer(a), SqlValue::Real(b)) => (*a as f64).partial_cmp(b),
            (SqlValue::Real(a), SqlValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (SqlValue::Real(a), SqlValue::Real(b)) => a.partial_cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::Boolean(a), SqlValue::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("null"),
            SqlValue::Integer(n) => write!(f, "{}", n),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Integer(n)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_domain() {
        assert_eq!(
            SqlValue::from_domain(&json!(7), ValueType::Integer).unwrap(),
            SqlValue::Integer(7)
        );
        assert_eq!(
            SqlValue::from_domain(&json!("a"), ValueType::Text).unwrap(),
            SqlValue::Text("a".to_string())
        );
        assert_eq!(
            SqlValue::from_domain(&Value::Null, ValueType::Text).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_from_domain_type_mismatch() {
        let err = SqlValue::from_domain(&json!("seven"), ValueType::Integer).unwrap_err();
        assert!(matches!(err, PersistError::ValueConversion(_)));
    }

    #[test]
    fn test_null_never_equal() {
        assert!(!SqlValue::Null.sql_eq(&SqlValue::Null));
        assert!(SqlValue::Integer(1).sql_eq(&SqlValue::Real(1.0)));
    }

    #[test]
    fn test_display_escapes_text() {
        assert_eq!(SqlValue::from("o'neil").to_string(), "'o''neil'");
    }
}
