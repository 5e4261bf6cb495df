//! Field wrappers carrying the unset sentinel
//!
//! Every record field is wrapped so that *presence* stays orthogonal to
//! *value*: a field left `Unset` is excluded from generated WHERE and SET
//! clauses, while a field set to `Null` or to a concrete value participates.
//! Scalar fields use [`Field`], single nested records use [`Nested`], and
//! record lists use [`Many`].

use crate::errors::{Error, Result};
use crate::schema::{FieldDef, FieldValue, Record};
use crate::value::{Scalar, SemanticType, Value};

/// A scalar field: unset, explicitly null, or a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T: Scalar> {
    Unset,
    Null,
    Value(T),
}

impl<T: Scalar> Field<T> {
    /// Whether this field participates in generated clauses.
    pub fn is_set(&self) -> bool {
        !matches!(self, Field::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Scalar> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T: Scalar> From<T> for Field<T> {
    fn from(val: T) -> Self {
        Field::Value(val)
    }
}

impl<T: Scalar> From<Option<T>> for Field<T> {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }
}

impl From<&str> for Field<String> {
    fn from(val: &str) -> Self {
        Field::Value(val.to_string())
    }
}

/// A single nested record reference.
///
/// The child is boxed so record types may refer to themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<R: Record> {
    Unset,
    Null,
    Value(Box<R>),
}

impl<R: Record> Nested<R> {
    pub fn is_set(&self) -> bool {
        !matches!(self, Nested::Unset)
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Nested::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<R: Record> Default for Nested<R> {
    fn default() -> Self {
        Nested::Unset
    }
}

impl<R: Record> From<R> for Nested<R> {
    fn from(val: R) -> Self {
        Nested::Value(Box::new(val))
    }
}

/// A list-of-records field.
///
/// `Unset` leaves existing links untouched on update; an empty list clears
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum Many<R: Record> {
    Unset,
    Value(Vec<R>),
}

impl<R: Record> Many<R> {
    pub fn is_set(&self) -> bool {
        !matches!(self, Many::Unset)
    }

    pub fn items(&self) -> Option<&[R]> {
        match self {
            Many::Value(v) => Some(v),
            Many::Unset => None,
        }
    }
}

impl<R: Record> Default for Many<R> {
    fn default() -> Self {
        Many::Unset
    }
}

impl<R: Record> From<Vec<R>> for Many<R> {
    fn from(val: Vec<R>) -> Self {
        Many::Value(val)
    }
}

/// Bridge between a declared wrapper type and the dynamic record form.
///
/// Implementations also produce the field's descriptor, which is how the
/// schema of a record type is derived statically from its declaration.
pub trait FieldType: Sized {
    fn field_def(name: &'static str) -> FieldDef;

    fn to_field_value(&self) -> FieldValue;

    fn from_field_value(name: &str, value: FieldValue) -> Result<Self>;
}

impl<T: Scalar> FieldType for Field<T> {
    fn field_def(name: &'static str) -> FieldDef {
        FieldDef {
            name,
            semantic: T::SEMANTIC,
            child: None,
        }
    }

    fn to_field_value(&self) -> FieldValue {
        match self {
            Field::Unset => FieldValue::Unset,
            Field::Null => FieldValue::Scalar(Value::Null),
            Field::Value(v) => FieldValue::Scalar(v.clone().into_value()),
        }
    }

    fn from_field_value(name: &str, value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Unset => Ok(Field::Unset),
            FieldValue::Scalar(Value::Null) => Ok(Field::Null),
            FieldValue::Scalar(v) => Ok(Field::Value(T::from_value(name, v)?)),
            _ => Err(Error::Schema(format!(
                "field {name} expected a scalar value"
            ))),
        }
    }
}

impl<R: Record> FieldType for Nested<R> {
    fn field_def(name: &'static str) -> FieldDef {
        FieldDef {
            name,
            semantic: SemanticType::Nested,
            child: Some(R::schema),
        }
    }

    fn to_field_value(&self) -> FieldValue {
        match self {
            Nested::Unset => FieldValue::Unset,
            Nested::Null => FieldValue::Nested(None),
            Nested::Value(r) => FieldValue::Nested(Some(Box::new(r.to_data()))),
        }
    }

    fn from_field_value(name: &str, value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Unset => Ok(Nested::Unset),
            FieldValue::Nested(None) => Ok(Nested::Null),
            FieldValue::Nested(Some(data)) => {
                Ok(Nested::Value(Box::new(R::from_data(*data)?)))
            }
            _ => Err(Error::Schema(format!(
                "field {name} expected a nested record"
            ))),
        }
    }
}

impl<R: Record> FieldType for Many<R> {
    fn field_def(name: &'static str) -> FieldDef {
        FieldDef {
            name,
            semantic: SemanticType::List,
            child: Some(R::schema),
        }
    }

    fn to_field_value(&self) -> FieldValue {
        match self {
            Many::Unset => FieldValue::Unset,
            Many::Value(items) => {
                FieldValue::List(items.iter().map(Record::to_data).collect())
            }
        }
    }

    fn from_field_value(name: &str, value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Unset => Ok(Many::Unset),
            FieldValue::List(items) => Ok(Many::Value(
                items.into_iter().map(R::from_data).collect::<Result<_>>()?,
            )),
            _ => Err(Error::Schema(format!(
                "field {name} expected a record list"
            ))),
        }
    }
}
