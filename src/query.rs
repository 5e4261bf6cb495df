//! Query construction
//!
//! Filter and order fragments are accumulated immutably across chained calls
//! and only rendered into statement text at the terminal operation. Filters
//! come from example objects (each set scalar field becomes one equality
//! predicate, ANDed) or from raw fragments used verbatim — the raw form is
//! an intentional escape hatch and is not sanitized.

use crate::schema::RecordData;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Single condition in a WHERE clause.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equality predicate derived from an example field; a null value
    /// renders as `IS NULL`.
    Eq { column: String, value: Value },
    /// Raw SQL fragment, used verbatim.
    Raw(String),
}

#[derive(Debug, Clone)]
pub enum OrderTerm {
    Column { column: String, order: SortOrder },
    Raw(String),
}

/// Accumulated filter and order state for one chained query.
///
/// Each chain call clones and extends; rendering happens once, at the
/// terminal operation.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order: Vec<OrderTerm>,
}

impl QueryState {
    /// Add one equality predicate per set scalar field of the example.
    /// An all-unset example adds nothing and therefore matches every row.
    pub fn filter_example(mut self, example: &RecordData) -> Self {
        for (column, value) in example.scalar_pairs() {
            self.conditions.push(Condition::Eq {
                column: column.to_string(),
                value,
            });
        }
        self
    }

    pub fn filter_raw(mut self, fragment: impl Into<String>) -> Self {
        self.conditions.push(Condition::Raw(fragment.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push(OrderTerm::Column {
            column: column.into(),
            order,
        });
        self
    }

    pub fn order_by_raw(mut self, fragment: impl Into<String>) -> Self {
        self.order.push(OrderTerm::Raw(fragment.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.order.is_empty()
    }

    /// Render the WHERE clause (with a leading space) and its bound
    /// parameters. Returns an empty string when no conditions are present.
    pub fn where_clause(&self) -> (String, Vec<Value>) {
        if self.conditions.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut params = Vec::new();
        let rendered: Vec<String> = self
            .conditions
            .iter()
            .map(|condition| match condition {
                Condition::Eq { column, value } => {
                    if value.is_null() {
                        format!("{column} IS NULL")
                    } else {
                        params.push(value.clone());
                        format!("{column} = ?")
                    }
                }
                Condition::Raw(fragment) => format!("({fragment})"),
            })
            .collect();

        (format!(" WHERE {}", rendered.join(" AND ")), params)
    }

    /// Render the ORDER BY clause (with a leading space), or an empty string.
    pub fn order_clause(&self) -> String {
        if self.order.is_empty() {
            return String::new();
        }

        let rendered: Vec<String> = self
            .order
            .iter()
            .map(|term| match term {
                OrderTerm::Column { column, order } => {
                    format!("{column} {}", order.to_sql())
                }
                OrderTerm::Raw(fragment) => fragment.clone(),
            })
            .collect();

        format!(" ORDER BY {}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::record;
    use crate::schema::Record;

    record! {
        struct Account {
            table = "account";
            name: Field<String>,
            balance: Field<f64>,
            closed: Field<bool>,
        }
    }

    #[test]
    fn empty_state_renders_nothing() {
        let state = QueryState::default();
        let (sql, params) = state.where_clause();
        assert_eq!(sql, "");
        assert!(params.is_empty());
        assert_eq!(state.order_clause(), "");
    }

    #[test]
    fn all_unset_example_matches_all_rows() {
        let state = QueryState::default().filter_example(&Account::default().to_data());
        let (sql, params) = state.where_clause();
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn set_fields_become_anded_equality_predicates() {
        let example = Account {
            name: "alice".into(),
            balance: 0.0.into(),
            ..Default::default()
        };
        let (sql, params) = QueryState::default()
            .filter_example(&example.to_data())
            .where_clause();
        assert_eq!(sql, " WHERE name = ? AND balance = ?");
        // A default-looking value still participates: presence is orthogonal
        // to value.
        assert_eq!(params, vec![Value::Text("alice".into()), Value::Real(0.0)]);
    }

    #[test]
    fn null_fields_render_is_null_without_parameters() {
        let example = Account {
            name: Field::Null,
            ..Default::default()
        };
        let (sql, params) = QueryState::default()
            .filter_example(&example.to_data())
            .where_clause();
        assert_eq!(sql, " WHERE name IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn raw_fragment_is_anded_after_example_predicates() {
        let example = Account {
            closed: false.into(),
            ..Default::default()
        };
        let (sql, params) = QueryState::default()
            .filter_example(&example.to_data())
            .filter_raw("balance > 100.0")
            .where_clause();
        assert_eq!(sql, " WHERE closed = ? AND (balance > 100.0)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn order_terms_and_raw_fragments_are_substitutable() {
        let state = QueryState::default()
            .order_by("name", SortOrder::Asc)
            .order_by("balance", SortOrder::Desc);
        assert_eq!(state.order_clause(), " ORDER BY name ASC, balance DESC");

        let raw = QueryState::default().order_by_raw("LENGTH(name) DESC");
        assert_eq!(raw.order_clause(), " ORDER BY LENGTH(name) DESC");
    }

    #[test]
    fn chained_states_do_not_share_mutations() {
        let base = QueryState::default().filter_raw("closed = 0");
        let extended = base.clone().order_by("name", SortOrder::Asc);
        assert!(base.order_clause().is_empty());
        assert_eq!(extended.order_clause(), " ORDER BY name ASC");
    }
}
