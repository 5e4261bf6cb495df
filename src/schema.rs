//! Record type descriptors
//!
//! A record type declares a fixed, ordered set of typed fields once; the
//! derived [`Schema`] is cached per type and drives column definitions, the
//! query builder, and relation maintenance. The [`record!`] macro is the
//! declaration surface: it generates the struct together with its [`Record`]
//! implementation, so the schema is derived statically at compile time
//! rather than through runtime reflection.

use crate::errors::{Error, Result};
use crate::value::{SemanticType, Value};

/// Descriptor of a single declared field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub semantic: SemanticType,
    /// Schema accessor of the child record type, for nested and list fields.
    pub child: Option<fn() -> &'static Schema>,
}

impl FieldDef {
    pub fn is_relation(&self) -> bool {
        matches!(self.semantic, SemanticType::Nested | SemanticType::List)
    }

    pub(crate) fn child_schema(&self) -> Result<&'static Schema> {
        self.child
            .map(|get| get())
            .ok_or_else(|| Error::Schema(format!("field {} has no child schema", self.name)))
    }
}

/// Derived description of one record type: ordered fields plus unique-key
/// metadata. Built once per type and cached behind `Record::schema`.
#[derive(Debug)]
pub struct Schema {
    /// Default table name for this record type.
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    /// Unique constraints; each entry is one (possibly compound) key.
    pub unique: Vec<Vec<&'static str>>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    pub fn has_relations(&self) -> bool {
        self.fields.iter().any(FieldDef::is_relation)
    }

    pub fn has_unique(&self) -> bool {
        !self.unique.is_empty()
    }

    /// Check that every unique-key column names a scalar field.
    pub(crate) fn validate_unique(&self, unique: &[Vec<String>]) -> Result<()> {
        for key in unique {
            for column in key {
                match self.field(column) {
                    Some(def) if !def.is_relation() => {}
                    Some(def) => {
                        return Err(Error::Schema(format!(
                            "unique key on {} names relation field {}",
                            self.name, def.name
                        )));
                    }
                    None => {
                        return Err(Error::Schema(format!(
                            "unique key on {} names unknown field {}",
                            self.name, column
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rendered `SELECT` column list: the rowid alias followed by every
    /// scalar column in declaration order.
    pub(crate) fn select_list(&self) -> String {
        let mut columns = vec!["_id"];
        columns.extend(self.scalar_fields().map(|f| f.name));
        columns.join(", ")
    }
}

/// Dynamic form of one field value inside a [`RecordData`].
#[derive(Debug, Clone)]
pub enum FieldValue {
    Unset,
    Scalar(Value),
    Nested(Option<Box<RecordData>>),
    List(Vec<RecordData>),
}

impl FieldValue {
    pub fn is_set(&self) -> bool {
        !matches!(self, FieldValue::Unset)
    }
}

/// A record decomposed into its dynamic form: the schema it follows plus one
/// value slot per declared field, in declaration order. This is the shape
/// the engine persists and hydrates; typed structs convert through it.
#[derive(Debug, Clone)]
pub struct RecordData {
    pub schema: &'static Schema,
    pub fields: Vec<FieldValue>,
}

impl RecordData {
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            fields: vec![FieldValue::Unset; schema.fields.len()],
            schema,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| &self.fields[i])
    }

    /// The set scalar fields as `(column, value)` pairs, in declaration
    /// order. Explicit nulls are included; unset fields are not.
    pub fn scalar_pairs(&self) -> Vec<(&'static str, Value)> {
        self.schema
            .fields
            .iter()
            .zip(&self.fields)
            .filter(|(def, _)| !def.is_relation())
            .filter_map(|(def, value)| match value {
                FieldValue::Scalar(v) => Some((def.name, v.clone())),
                _ => None,
            })
            .collect()
    }

    /// The set relation fields as `(index, descriptor, value)` tuples.
    pub(crate) fn relation_entries(&self) -> Vec<(usize, &FieldDef, &FieldValue)> {
        self.schema
            .fields
            .iter()
            .zip(&self.fields)
            .enumerate()
            .filter(|(_, (def, value))| def.is_relation() && value.is_set())
            .map(|(i, (def, value))| (i, def, value))
            .collect()
    }
}

/// A fixed-schema value object that maps onto a table.
///
/// Implemented through the [`record!`] macro; the schema is derived once per
/// type and cached, so repeated binding is cheap.
pub trait Record: Clone + Send + Sync + Sized + 'static {
    fn schema() -> &'static Schema;

    fn to_data(&self) -> RecordData;

    fn from_data(data: RecordData) -> Result<Self>;
}

/// Declare a record type and derive its [`Record`] implementation.
///
/// ```
/// use rowstash::prelude::*;
///
/// record! {
///     pub struct Author {
///         table = "author";
///         unique = [name];
///         name: Field<String>,
///     }
/// }
///
/// record! {
///     pub struct Book {
///         table = "book";
///         unique = [title];
///         title: Field<String>,
///         authors: Many<Author>,
///     }
/// }
/// ```
///
/// `unique` is optional and accepts a single key (`[a]`), one compound key
/// (`[a, b]`), or several constraints (`[[a], [b, c]]`).
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table = $table:expr;
            unique = $unique:tt;
            $($rest:tt)+
        }
    ) => {
        $crate::record!(@impl
            $(#[$meta])*
            $vis struct $name {
                table = $table;
                unique = { $unique };
                $($rest)+
            }
        );
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table = $table:expr;
            $($rest:tt)+
        }
    ) => {
        $crate::record!(@impl
            $(#[$meta])*
            $vis struct $name {
                table = $table;
                unique = { };
                $($rest)+
            }
        );
    };
    (@impl
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table = $table:expr;
            unique = { $($unique:tt)? };
            $($fvis:vis $field:ident : $fty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        $vis struct $name {
            $($fvis $field : $fty),+
        }

        impl $crate::schema::Record for $name {
            fn schema() -> &'static $crate::schema::Schema {
                static SCHEMA: ::std::sync::LazyLock<$crate::schema::Schema> =
                    ::std::sync::LazyLock::new(|| $crate::schema::Schema {
                        name: $table,
                        fields: vec![
                            $(<$fty as $crate::field::FieldType>::field_def(
                                stringify!($field),
                            )),+
                        ],
                        unique: $crate::record!(@unique $($unique)?),
                    });
                &SCHEMA
            }

            fn to_data(&self) -> $crate::schema::RecordData {
                $crate::schema::RecordData {
                    schema: <Self as $crate::schema::Record>::schema(),
                    fields: vec![
                        $($crate::field::FieldType::to_field_value(&self.$field)),+
                    ],
                }
            }

            fn from_data(
                data: $crate::schema::RecordData,
            ) -> ::std::result::Result<Self, $crate::errors::Error> {
                let mut values = data.fields.into_iter();
                Ok(Self {
                    $($field: $crate::field::FieldType::from_field_value(
                        stringify!($field),
                        values.next().unwrap_or($crate::schema::FieldValue::Unset),
                    )?),+
                })
            }
        }
    };
    (@unique) => { Vec::new() };
    (@unique [$([$($col:ident),+ $(,)?]),+ $(,)?]) => {
        vec![$(vec![$(stringify!($col)),+]),+]
    };
    (@unique [$($col:ident),+ $(,)?]) => {
        vec![vec![$(stringify!($col)),+]]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, Many, Nested};

    record! {
        struct Leaf {
            table = "leaf";
            unique = [label];
            label: Field<String>,
        }
    }

    record! {
        struct Branch {
            table = "branch";
            unique = [[code], [kind, rank]];
            code: Field<String>,
            kind: Field<String>,
            rank: Field<i64>,
            top: Nested<Leaf>,
            leaves: Many<Leaf>,
        }
    }

    #[test]
    fn schema_is_derived_in_declaration_order() {
        let schema = Branch::schema();
        assert_eq!(schema.name, "branch");
        let names: Vec<_> = schema.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["code", "kind", "rank", "top", "leaves"]);
        assert_eq!(schema.fields[3].semantic, SemanticType::Nested);
        assert_eq!(schema.fields[4].semantic, SemanticType::List);
        assert!(schema.has_relations());
    }

    #[test]
    fn unique_forms_expand_like_the_declaration() {
        assert_eq!(Leaf::schema().unique, vec![vec!["label"]]);
        assert_eq!(
            Branch::schema().unique,
            vec![vec!["code"], vec!["kind", "rank"]]
        );
    }

    #[test]
    fn schema_is_cached_per_type() {
        assert!(std::ptr::eq(Branch::schema(), Branch::schema()));
    }

    #[test]
    fn select_list_skips_relation_fields() {
        assert_eq!(Branch::schema().select_list(), "_id, code, kind, rank");
    }

    #[test]
    fn scalar_pairs_exclude_unset_fields() {
        let branch = Branch {
            code: "b-1".into(),
            rank: Field::Null,
            ..Default::default()
        };
        let pairs = branch.to_data().scalar_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("code", Value::Text("b-1".into())));
        assert_eq!(pairs[1], ("rank", Value::Null));
    }

    #[test]
    fn validate_unique_rejects_unknown_and_relation_columns() {
        let schema = Branch::schema();
        assert!(schema.validate_unique(&[vec!["code".into()]]).is_ok());
        assert!(schema.validate_unique(&[vec!["missing".into()]]).is_err());
        assert!(schema.validate_unique(&[vec!["leaves".into()]]).is_err());
    }

    #[test]
    fn typed_round_trip_through_dynamic_form() {
        let branch = Branch {
            code: "b-2".into(),
            kind: "oak".into(),
            rank: 3i64.into(),
            top: Leaf { label: "crown".into() }.into(),
            leaves: vec![Leaf { label: "l1".into() }, Leaf { label: "l2".into() }].into(),
        };
        let back = Branch::from_data(branch.to_data()).unwrap();
        assert_eq!(back, branch);
    }
}
