//! Error types for the rowstash crate
//!
//! This module contains all error types that can be returned by rowstash
//! operations. Schema and type errors are never silently coerced; they abort
//! the operation and surface to the caller. Relation-cascade failures abort
//! the whole enclosing transaction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Incompatible or missing type, column, or unique-key information.
    #[error("schema error: {0}")]
    Schema(String),

    /// A stored value could not be coerced back to the declared field type.
    #[error("type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    /// An exactly-one read matched more than one row.
    #[error("query on {table} matched more than one row where exactly one was expected")]
    MultipleResults { table: String },

    /// An expected single row is absent. Recoverable; the caller decides.
    #[error("no matching row in {table}")]
    NotFound { table: String },

    /// Relation graph traversal re-entered a row already on the current path.
    #[error("relation cycle detected at {table} row {key}")]
    Cycle { table: String, key: i64 },

    /// Failure reported by the underlying store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
