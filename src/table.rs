//! Table binding and the chainable table handle
//!
//! A [`Table`] binds one record type to one physical table name. The handle
//! carries accumulated filter/order state immutably across chained calls and
//! owns a statement cache, so repeated terminal operations on the same handle
//! reuse rendered fragments instead of rebuilding them. The shared
//! [`TableRegistry`] tracks which tables this database handle has created,
//! their column types, and their effective unique keys.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, RwLock};

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::query::{QueryState, SortOrder};
use crate::relations;
use crate::schema::{Record, Schema};
use crate::value::{bind_value, SemanticType};

/// Per-table bookkeeping: the union of bound columns and the unique keys the
/// table was created with.
struct TableInfo {
    columns: HashMap<String, SemanticType>,
    unique: Vec<Vec<String>>,
}

/// Registry of tables created through one database handle.
///
/// Owned explicitly by the handle rather than hidden in a global, and
/// consulted for unique-key resolution and bind-compatibility checks.
#[derive(Default)]
pub(crate) struct TableRegistry {
    inner: RwLock<HashMap<String, TableInfo>>,
}

#[derive(Debug)]
struct RegisterOutcome {
    /// Columns present in the newly bound type but not yet in the table.
    added_columns: Vec<(String, SemanticType)>,
}

impl TableRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Unique keys in effect for a table: the ones it was created with, or
    /// the record type's declared keys when the table is not registered.
    pub(crate) fn effective_unique(&self, table: &str, schema: &Schema) -> Vec<Vec<String>> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match map.get(table) {
            Some(info) => info.unique.clone(),
            None => schema
                .unique
                .iter()
                .map(|key| key.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Register a record type against a table, forming the column union.
    ///
    /// A column already bound under a different semantic type, or a
    /// conflicting unique-key definition on an existing table, is a schema
    /// error rather than silent corruption.
    fn register(
        &self,
        table: &str,
        schema: &Schema,
        unique: &[Vec<String>],
    ) -> Result<RegisterOutcome> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(table) {
            None => {
                let columns = schema
                    .scalar_fields()
                    .map(|def| (def.name.to_string(), def.semantic))
                    .collect();
                map.insert(
                    table.to_string(),
                    TableInfo {
                        columns,
                        unique: unique.to_vec(),
                    },
                );
                Ok(RegisterOutcome {
                    added_columns: Vec::new(),
                })
            }
            Some(info) => {
                let mut added = Vec::new();
                for def in schema.scalar_fields() {
                    match info.columns.get(def.name) {
                        Some(existing) if *existing != def.semantic => {
                            return Err(Error::Schema(format!(
                                "column {} of table {table} is {} but {} binds it as {}",
                                def.name,
                                existing.name(),
                                schema.name,
                                def.semantic.name()
                            )));
                        }
                        Some(_) => {}
                        None => {
                            info.columns.insert(def.name.to_string(), def.semantic);
                            added.push((def.name.to_string(), def.semantic));
                        }
                    }
                }
                if !unique.is_empty() && info.unique != unique {
                    return Err(Error::Schema(format!(
                        "conflicting unique-key definitions for existing table {table}"
                    )));
                }
                Ok(RegisterOutcome {
                    added_columns: added,
                })
            }
        }
    }

    fn forget(&self, table: &str) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(table);
    }
}

/// Cached statement fragments for one table handle, shared by every handle
/// cloned off it through chaining.
#[derive(Default)]
struct StatementCache {
    select_base: OnceLock<String>,
    count_base: OnceLock<String>,
}

/// Handle binding a record type to a table, with chainable query state.
pub struct Table<R: Record> {
    pool: SqlitePool,
    registry: Arc<TableRegistry>,
    name: Arc<str>,
    query: QueryState,
    stmts: Arc<StatementCache>,
    _marker: PhantomData<R>,
}

impl<R: Record> Clone for Table<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            name: Arc::clone(&self.name),
            query: self.query.clone(),
            stmts: Arc::clone(&self.stmts),
            _marker: PhantomData,
        }
    }
}

impl<R: Record> Table<R> {
    pub(crate) fn new(
        pool: SqlitePool,
        registry: Arc<TableRegistry>,
        name: Option<&str>,
    ) -> Self {
        Self {
            pool,
            registry,
            name: name.unwrap_or(R::schema().name).into(),
            query: QueryState::default(),
            stmts: Arc::new(StatementCache::default()),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn chained(&self, query: QueryState) -> Self {
        let mut next = self.clone();
        next.query = query;
        next
    }

    /// Narrow the result set by an example object: every set field becomes
    /// an equality predicate.
    pub fn filter(&self, example: &R) -> Self {
        self.chained(self.query.clone().filter_example(&example.to_data()))
    }

    /// Append a raw SQL fragment to the WHERE clause, verbatim.
    pub fn filter_raw(&self, fragment: impl Into<String>) -> Self {
        self.chained(self.query.clone().filter_raw(fragment))
    }

    pub fn order_by(&self, column: impl Into<String>, order: SortOrder) -> Self {
        self.chained(self.query.clone().order_by(column, order))
    }

    pub fn order_by_raw(&self, fragment: impl Into<String>) -> Self {
        self.chained(self.query.clone().order_by_raw(fragment))
    }

    fn select_base(&self) -> &str {
        self.stmts
            .select_base
            .get_or_init(|| format!("SELECT {} FROM {}", R::schema().select_list(), self.name))
    }

    fn count_base(&self) -> &str {
        self.stmts
            .count_base
            .get_or_init(|| format!("SELECT COUNT(*) FROM {}", self.name))
    }

    /// Create this table (and, transitively, the tables of every referenced
    /// record type plus the junction table) using the record type's declared
    /// unique keys. Idempotent.
    pub async fn create(&self) -> Result<()> {
        let unique = owned_unique(&R::schema().unique);
        self.create_inner(&unique).await
    }

    /// Create with an explicit unique-key definition overriding the record
    /// type's declaration: one key per entry, compound keys as multiple
    /// columns.
    pub async fn create_with_unique(&self, unique: &[&[&str]]) -> Result<()> {
        let unique: Vec<Vec<String>> = unique
            .iter()
            .map(|key| key.iter().map(|c| c.to_string()).collect())
            .collect();
        self.create_inner(&unique).await
    }

    /// Drop the table if it exists, then create it fresh.
    pub async fn create_drop(&self) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.name);
        debug!(sql = sql.as_str(), "dropping table");
        sqlx::query(&sql).execute(&self.pool).await?;
        self.registry.forget(&self.name);
        self.create().await
    }

    async fn create_inner(&self, unique: &[Vec<String>]) -> Result<()> {
        let schema = R::schema();
        schema.validate_unique(unique)?;

        let mut conn = self.pool.acquire().await?;
        create_one(&mut conn, &self.registry, &self.name, schema, unique).await?;

        // Tables of referenced record types, transitively. Self-referential
        // schemas terminate through the seen set.
        let mut any_relations = schema.has_relations();
        let mut seen: Vec<&'static str> = vec![schema.name];
        let mut stack: Vec<&'static Schema> = Vec::new();
        for def in schema.relation_fields() {
            stack.push(def.child_schema()?);
        }
        while let Some(child) = stack.pop() {
            if seen.contains(&child.name) {
                continue;
            }
            seen.push(child.name);
            any_relations = true;

            let child_unique = owned_unique(&child.unique);
            child.validate_unique(&child_unique)?;
            create_one(&mut conn, &self.registry, child.name, child, &child_unique).await?;
            for def in child.relation_fields() {
                stack.push(def.child_schema()?);
            }
        }

        if any_relations {
            relations::ensure_links_table(&mut conn).await?;
        }
        Ok(())
    }

    /// Whether the physical table exists in the store.
    pub async fn exists(&self) -> Result<bool> {
        let row =
            sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&*self.name)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.try_get::<i64, _>(0)? > 0)
    }

    /// Insert-or-update one record, together with everything it references.
    ///
    /// With a unique key declared this is a single-row upsert; without one
    /// it is a plain insert. Returns the row's key.
    pub async fn put(&self, obj: &R) -> Result<i64> {
        let data = obj.to_data();
        let mut tx = self.pool.begin().await?;
        let rowid =
            relations::persist_record(&mut tx, self.registry.as_ref(), &self.name, &data, false)
                .await?;
        tx.commit().await?;
        Ok(rowid)
    }

    /// Fetch the single row matching the accumulated filter, hydrated.
    ///
    /// `Ok(None)` when nothing matches; an error when more than one row does.
    pub async fn get(&self) -> Result<Option<R>> {
        let (where_sql, params) = self.query.where_clause();
        let order_sql = self.query.order_clause();
        let sql = format!("{}{where_sql}{order_sql} LIMIT 2", self.select_base());

        let mut conn = self.pool.acquire().await?;
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(self.hydrate(&mut conn, &rows[0]).await?)),
            _ => Err(Error::MultipleResults {
                table: self.name.to_string(),
            }),
        }
    }

    /// Like [`get`](Self::get), but absence is an error.
    pub async fn one(&self) -> Result<R> {
        self.get().await?.ok_or_else(|| Error::NotFound {
            table: self.name.to_string(),
        })
    }

    /// Fetch every matching row, hydrated, honoring the accumulated order.
    pub async fn all(&self) -> Result<Vec<R>> {
        let (where_sql, params) = self.query.where_clause();
        let order_sql = self.query.order_clause();
        let sql = format!("{}{where_sql}{order_sql}", self.select_base());

        let mut conn = self.pool.acquire().await?;
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(self.hydrate(&mut conn, row).await?);
        }
        Ok(results)
    }

    /// Update the set fields of `updates` on every row matching the
    /// accumulated filter. Unset fields are untouched; set relation fields
    /// are reconciled per matched row. Returns the matched-row count.
    pub async fn set(&self, updates: &R) -> Result<u64> {
        let data = updates.to_data();
        let scalars = data.scalar_pairs();
        let relation_entries = data.relation_entries();
        let (where_sql, params) = self.query.where_clause();

        let mut tx = self.pool.begin().await?;
        let ids = self.matched_ids(&mut tx, &where_sql, params).await?;
        if ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        if !scalars.is_empty() {
            let setters: Vec<String> = scalars.iter().map(|(c, _)| format!("{c} = ?")).collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "UPDATE {} SET {} WHERE _id IN ({placeholders})",
                self.name,
                setters.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for (_, value) in &scalars {
                query = bind_value(query, value.clone());
            }
            for id in &ids {
                query = query.bind(*id);
            }
            query.execute(&mut *tx).await?;
        }

        for id in &ids {
            let key = id.to_string();
            for (_, def, value) in &relation_entries {
                relations::reconcile_field(
                    &mut tx,
                    self.registry.as_ref(),
                    &self.name,
                    &key,
                    def,
                    value,
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    /// Delete every matching row, cascading relation cleanup. Returns the
    /// deleted-row count.
    pub async fn delete(&self) -> Result<u64> {
        let (where_sql, params) = self.query.where_clause();
        let mut tx = self.pool.begin().await?;
        let ids = self.matched_ids(&mut tx, &where_sql, params).await?;
        for id in &ids {
            relations::delete_row(&mut tx, &self.name, *id).await?;
        }
        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    /// Count matching rows. No hydration; relation fields are not touched.
    pub async fn count(&self) -> Result<u64> {
        let (where_sql, params) = self.query.where_clause();
        let sql = format!("{}{where_sql}", self.count_base());
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind_value(query, param);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)? as u64)
    }

    async fn matched_ids(
        &self,
        conn: &mut SqliteConnection,
        where_sql: &str,
        params: Vec<crate::value::Value>,
    ) -> Result<Vec<i64>> {
        let sql = format!("SELECT _id FROM {}{where_sql}", self.name);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>(0).map_err(Error::from))
            .collect()
    }

    async fn hydrate(&self, conn: &mut SqliteConnection, row: &SqliteRow) -> Result<R> {
        let schema = R::schema();
        let key: i64 = row.try_get("_id")?;
        let mut data = relations::data_from_row(schema, row)?;
        if schema.has_relations() {
            let mut visited = vec![(self.name.to_string(), key)];
            relations::load_relations(&mut *conn, &self.name, key, &mut data, &mut visited)
                .await?;
        }
        R::from_data(data)
    }
}

fn owned_unique(unique: &[Vec<&'static str>]) -> Vec<Vec<String>> {
    unique
        .iter()
        .map(|key| key.iter().map(|c| c.to_string()).collect())
        .collect()
}

async fn create_one(
    conn: &mut SqliteConnection,
    registry: &TableRegistry,
    name: &str,
    schema: &Schema,
    unique: &[Vec<String>],
) -> Result<()> {
    let outcome = registry.register(name, schema, unique)?;

    let ddl = table_ddl(name, schema, unique);
    debug!(sql = ddl.as_str(), "creating table");
    sqlx::query(&ddl).execute(&mut *conn).await?;

    // Columns contributed by additional record types bound to this table.
    for (column, semantic) in &outcome.added_columns {
        let sql = format!(
            "ALTER TABLE {name} ADD COLUMN {column} {}",
            semantic.column_type().unwrap_or("TEXT")
        );
        debug!(sql = sql.as_str(), "extending table");
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

fn table_ddl(name: &str, schema: &Schema, unique: &[Vec<String>]) -> String {
    let mut parts = vec!["_id INTEGER PRIMARY KEY".to_string()];
    for def in schema.scalar_fields() {
        parts.push(format!(
            "{} {}",
            def.name,
            def.semantic.column_type().unwrap_or("TEXT")
        ));
    }
    for key in unique {
        parts.push(format!("UNIQUE ({})", key.join(", ")));
    }
    format!("CREATE TABLE IF NOT EXISTS {name} ({})", parts.join(", "))
}
