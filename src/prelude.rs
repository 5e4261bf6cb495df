//! Convenience re-exports for common record-store usage

// Record declaration surface
pub use crate::field::{Field, Many, Nested};
pub use crate::record;
pub use crate::schema::{Record, RecordData, Schema};

// Store handle and table binding
pub use crate::config::DatabaseConfig;
pub use crate::db::Database;
pub use crate::table::Table;

// Query building
pub use crate::query::SortOrder;

// Error types
pub use crate::errors::{Error, Result};

// Value layer
pub use crate::value::{Scalar, SemanticType, Value};

// Common external dependencies that are frequently used
pub use chrono::{DateTime, Utc};
