//! Dynamic values and column mapping
//!
//! This module defines the runtime value type carried between records and the
//! store, the mapping from semantic field types to SQLite column types, and
//! the coercions applied when reading stored values back into typed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

use crate::errors::{Error, Result};

/// A single stored value in its dynamic form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
        }
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::Integer(val)
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Real(val)
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::Text(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Text(val.to_string())
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Boolean(val)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(val: DateTime<Utc>) -> Self {
        Value::Timestamp(val)
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Blob(val)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Semantic storage type of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Blob,
    /// A single nested record, carried by the junction table.
    Nested,
    /// A list of nested records, carried by the junction table.
    List,
}

impl SemanticType {
    /// SQLite column type for this semantic type.
    ///
    /// Nested and list fields have no column of their own; their storage is
    /// the junction table maintained by the relation manager.
    pub fn column_type(self) -> Option<&'static str> {
        match self {
            SemanticType::Integer | SemanticType::Boolean => Some("INTEGER"),
            SemanticType::Real => Some("REAL"),
            // Timestamps are stored as ISO-8601 text.
            SemanticType::Text | SemanticType::Timestamp => Some("TEXT"),
            SemanticType::Blob => Some("BLOB"),
            SemanticType::Nested | SemanticType::List => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::Real => "real",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Blob => "blob",
            SemanticType::Nested => "nested",
            SemanticType::List => "list",
        }
    }
}

/// A Rust type that maps onto exactly one scalar column.
pub trait Scalar: Clone + Send + Sync + Sized + 'static {
    const SEMANTIC: SemanticType;

    fn into_value(self) -> Value;

    /// Coerce a stored value back to the declared field type.
    fn from_value(column: &str, value: Value) -> Result<Self>;
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

impl Scalar for i64 {
    const SEMANTIC: SemanticType = SemanticType::Integer;

    fn into_value(self) -> Value {
        Value::Integer(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(v),
            Value::Boolean(v) => Ok(v as i64),
            other => Err(mismatch(column, "integer", &other)),
        }
    }
}

impl Scalar for f64 {
    const SEMANTIC: SemanticType = SemanticType::Real;

    fn into_value(self) -> Value {
        Value::Real(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Real(v) => Ok(v),
            // SQLite stores integral reals as integers; widen back.
            Value::Integer(v) => Ok(v as f64),
            other => Err(mismatch(column, "real", &other)),
        }
    }
}

impl Scalar for String {
    const SEMANTIC: SemanticType = SemanticType::Text;

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(mismatch(column, "text", &other)),
        }
    }
}

impl Scalar for bool {
    const SEMANTIC: SemanticType = SemanticType::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Boolean(v) => Ok(v),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(mismatch(column, "boolean", &other)),
        }
    }
}

impl Scalar for DateTime<Utc> {
    const SEMANTIC: SemanticType = SemanticType::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            Value::Text(ref text) => text
                .parse::<DateTime<Utc>>()
                .map_err(|_| mismatch(column, "timestamp", &value)),
            other => Err(mismatch(column, "timestamp", &other)),
        }
    }
}

impl Scalar for Vec<u8> {
    const SEMANTIC: SemanticType = SemanticType::Blob;

    fn into_value(self) -> Value {
        Value::Blob(self)
    }

    fn from_value(column: &str, value: Value) -> Result<Self> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(mismatch(column, "blob", &other)),
        }
    }
}

/// Bind a dynamic value as the next parameter of a SQLite query.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<i64>::None),
        Value::Integer(v) => query.bind(v),
        Value::Real(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Boolean(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::Blob(v) => query.bind(v),
    }
}

/// Read one column of a fetched row back into its dynamic form, typed by the
/// column's semantic type.
pub(crate) fn value_from_row(
    row: &SqliteRow,
    column: &str,
    semantic: SemanticType,
) -> Result<Value> {
    let decode_err = |e: sqlx::Error| Error::TypeMismatch {
        column: column.to_string(),
        expected: semantic.name(),
        found: e.to_string(),
    };

    let value = match semantic {
        SemanticType::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map_err(decode_err)?
            .map(Value::Integer),
        SemanticType::Real => row
            .try_get::<Option<f64>, _>(column)
            .map_err(decode_err)?
            .map(Value::Real),
        SemanticType::Text => row
            .try_get::<Option<String>, _>(column)
            .map_err(decode_err)?
            .map(Value::Text),
        SemanticType::Boolean => row
            .try_get::<Option<bool>, _>(column)
            .map_err(decode_err)?
            .map(Value::Boolean),
        SemanticType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(column)
            .map_err(decode_err)?
            .map(Value::Timestamp),
        SemanticType::Blob => row
            .try_get::<Option<Vec<u8>>, _>(column)
            .map_err(decode_err)?
            .map(Value::Blob),
        SemanticType::Nested | SemanticType::List => {
            return Err(Error::Schema(format!(
                "field {column} is a relation and has no column"
            )));
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn column_types_follow_sqlite_affinities() {
        assert_eq!(SemanticType::Integer.column_type(), Some("INTEGER"));
        assert_eq!(SemanticType::Boolean.column_type(), Some("INTEGER"));
        assert_eq!(SemanticType::Real.column_type(), Some("REAL"));
        assert_eq!(SemanticType::Text.column_type(), Some("TEXT"));
        assert_eq!(SemanticType::Timestamp.column_type(), Some("TEXT"));
        assert_eq!(SemanticType::Blob.column_type(), Some("BLOB"));
        assert_eq!(SemanticType::Nested.column_type(), None);
        assert_eq!(SemanticType::List.column_type(), None);
    }

    #[test]
    fn scalar_coercions() {
        assert_eq!(i64::from_value("n", Value::Integer(7)).unwrap(), 7);
        assert_eq!(f64::from_value("x", Value::Integer(2)).unwrap(), 2.0);
        assert!(bool::from_value("b", Value::Integer(1)).unwrap());
        assert!(!bool::from_value("b", Value::Integer(0)).unwrap());
        assert!(matches!(
            i64::from_value("n", Value::Text("oops".into())),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            bool::from_value("b", Value::Integer(5)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn timestamp_parses_from_stored_text() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let parsed =
            DateTime::<Utc>::from_value("at", Value::Text(ts.to_rfc3339())).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }
}
