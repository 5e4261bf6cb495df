//! Store handle
//!
//! [`Database`] owns the connection pool and the table registry. The pool is
//! pinned to a single connection: the store is an embedded file, hydration
//! issues follow-up statements while result rows are still being walked, and
//! one connection makes every terminal operation see one consistent snapshot.
//! Handles are cheap to clone and share the pool and registry.

use std::sync::Arc;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::schema::Record;
use crate::table::{Table, TableRegistry};

/// Handle to one open store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    registry: Arc<TableRegistry>,
}

impl Database {
    /// Open (creating if missing) the store file at `path`.
    pub async fn connect(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::connect_with(&DatabaseConfig::with_path(path)).await
    }

    /// Open a private in-memory store, mostly useful in tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect_with(&DatabaseConfig::default()).await
    }

    pub async fn connect_with(config: &DatabaseConfig) -> Result<Self> {
        // One connection, never recycled: an in-memory store lives and dies
        // with its connection, and file stores get serialized writers for
        // free.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(config.connect_options())
            .await?;
        debug!(path = %config.path.display(), "store opened");
        Ok(Self {
            pool,
            registry: Arc::new(TableRegistry::new()),
        })
    }

    /// Bind a record type to its declared table name.
    pub fn table<R: Record>(&self) -> Table<R> {
        Table::new(self.pool.clone(), Arc::clone(&self.registry), None)
    }

    /// Bind a record type to an explicit table name, overriding the
    /// declaration. Several record types may bind the same table.
    pub fn table_named<R: Record>(&self, name: &str) -> Table<R> {
        Table::new(self.pool.clone(), Arc::clone(&self.registry), Some(name))
    }

    /// Create the table for `R` with its declared unique keys.
    pub async fn create<R: Record>(&self) -> Result<()> {
        self.table::<R>().create().await
    }

    /// Insert-or-update one record; returns its row key.
    pub async fn put<R: Record>(&self, obj: &R) -> Result<i64> {
        self.table::<R>().put(obj).await
    }

    /// Fetch the single record matching the example, if any.
    pub async fn get<R: Record>(&self, example: &R) -> Result<Option<R>> {
        self.table::<R>().filter(example).get().await
    }

    /// Fetch the single record matching the example; absence is an error.
    pub async fn one<R: Record>(&self, example: &R) -> Result<R> {
        self.table::<R>().filter(example).one().await
    }

    /// Fetch every record matching the example.
    pub async fn all<R: Record>(&self, example: &R) -> Result<Vec<R>> {
        self.table::<R>().filter(example).all().await
    }

    /// Apply the set fields of `updates` to every record matching the
    /// example; returns the matched-row count.
    pub async fn set<R: Record>(&self, example: &R, updates: &R) -> Result<u64> {
        self.table::<R>().filter(example).set(updates).await
    }

    /// Delete every record matching the example; returns the deleted count.
    pub async fn delete<R: Record>(&self, example: &R) -> Result<u64> {
        self.table::<R>().filter(example).delete().await
    }

    /// Count the records matching the example.
    pub async fn count<R: Record>(&self, example: &R) -> Result<u64> {
        self.table::<R>().filter(example).count().await
    }

    /// The underlying pool, for statements this crate does not model.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
