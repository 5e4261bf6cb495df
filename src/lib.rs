//! # rowstash
//!
//! An embedded record store: declare plain value types once, then persist,
//! query, update, and delete them through tables without writing SQL. Nested
//! and list-valued fields are stored relationally through a junction table
//! with reference counting, so shared children are written once and removed
//! automatically when the last reference disappears.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rowstash::prelude::*;
//!
//! record! {
//!     pub struct Author {
//!         table = "author";
//!         unique = [name];
//!         name: Field<String>,
//!     }
//! }
//!
//! record! {
//!     pub struct Book {
//!         table = "book";
//!         unique = [title];
//!         title: Field<String>,
//!         year: Field<i64>,
//!         authors: Many<Author>,
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rowstash::Error> {
//!     let db = Database::connect("library.db").await?;
//!     db.create::<Book>().await?;
//!
//!     db.put(&Book {
//!         title: "The Dispossessed".into(),
//!         year: 1974.into(),
//!         authors: vec![Author { name: "Ursula K. Le Guin".into() }].into(),
//!     })
//!     .await?;
//!
//!     // Query by example: set fields become predicates, unset fields match
//!     // everything.
//!     let from_1974 = db
//!         .all(&Book {
//!             year: 1974.into(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{} book(s)", from_1974.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! Every field is wrapped ([`Field`](field::Field), [`Nested`](field::Nested),
//! [`Many`](field::Many)) so that *unset* stays distinct from *null*: an unset
//! field neither filters a query nor overwrites a column on update.

pub mod config;
pub mod db;
pub mod errors;
pub mod field;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod table;
pub mod value;

mod relations;

pub use config::DatabaseConfig;
pub use db::Database;
pub use errors::{Error, Result};
pub use field::{Field, Many, Nested};
pub use query::SortOrder;
pub use schema::{Record, RecordData, Schema};
pub use table::Table;
pub use value::{Scalar, SemanticType, Value};
