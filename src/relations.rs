//! Relation maintenance
//!
//! Nested and list-valued fields are not stored inline: every parent→child
//! edge lives in the `_links` junction table, keyed by text-encoded rowids.
//! Writes persist children first, then diff the stored link set for the
//! field against the new one; a child whose last link disappears is removed
//! from its own table, transitively. Reads hydrate children back through the
//! link set, guarded by a visited path so a cyclic graph fails closed
//! instead of recursing unboundedly.

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::{debug, trace};

use crate::errors::{Error, Result};
use crate::query::{Condition, QueryState};
use crate::schema::{FieldDef, FieldValue, RecordData, Schema};
use crate::table::TableRegistry;
use crate::value::{bind_value, value_from_row, SemanticType, Value};

/// Junction table recording parent→child references with a per-link
/// reference count and a sequence number preserving list order.
pub(crate) const LINKS_TABLE: &str = "_links";

pub(crate) const LINKS_DDL: &str = "CREATE TABLE IF NOT EXISTS _links (\
    parent_table TEXT NOT NULL, \
    parent_key TEXT NOT NULL, \
    field_name TEXT NOT NULL, \
    child_table TEXT NOT NULL, \
    child_key TEXT NOT NULL, \
    seq INTEGER NOT NULL DEFAULT 0, \
    refcount INTEGER NOT NULL DEFAULT 1, \
    UNIQUE (parent_table, parent_key, field_name, child_table, child_key))";

pub(crate) async fn ensure_links_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(LINKS_DDL).execute(conn).await?;
    Ok(())
}

struct LinkRow {
    child_table: String,
    child_key: i64,
}

async fn fetch_links(
    conn: &mut SqliteConnection,
    parent_table: &str,
    parent_key: &str,
    field: Option<&str>,
) -> Result<Vec<LinkRow>> {
    let sql = match field {
        Some(_) => format!(
            "SELECT child_table, child_key FROM {LINKS_TABLE} \
             WHERE parent_table = ? AND parent_key = ? AND field_name = ? ORDER BY seq"
        ),
        None => format!(
            "SELECT child_table, child_key FROM {LINKS_TABLE} \
             WHERE parent_table = ? AND parent_key = ? ORDER BY seq"
        ),
    };
    let mut query = sqlx::query(&sql).bind(parent_table).bind(parent_key);
    if let Some(field) = field {
        query = query.bind(field);
    }

    let rows = query.fetch_all(&mut *conn).await?;
    rows.into_iter()
        .map(|row| {
            let child_table: String = row.try_get("child_table")?;
            let key_text: String = row.try_get("child_key")?;
            let child_key = key_text.parse::<i64>().map_err(|_| {
                Error::Schema(format!(
                    "corrupt link entry: child key {key_text} for {child_table}"
                ))
            })?;
            Ok(LinkRow {
                child_table,
                child_key,
            })
        })
        .collect()
}

/// Insert a plain row from its set scalar fields and return its rowid.
async fn insert_row(
    conn: &mut SqliteConnection,
    table: &str,
    scalars: &[(&'static str, Value)],
) -> Result<i64> {
    let sql = if scalars.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES RETURNING _id")
    } else {
        let columns: Vec<&str> = scalars.iter().map(|(c, _)| *c).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders}) RETURNING _id",
            columns.join(", ")
        )
    };
    trace!(table, sql = sql.as_str(), "insert");

    let mut query = sqlx::query(&sql);
    for (_, value) in scalars {
        query = bind_value(query, value.clone());
    }
    let row = query.fetch_one(&mut *conn).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

/// Write one record (and, recursively, everything it references) inside the
/// caller's transaction. Returns the row's key.
///
/// Top-level writes (`nested == false`) follow put semantics: upsert through
/// the table's unique key when one is declared, plain insert otherwise.
/// Child writes reuse an existing row instead of inserting a duplicate: by
/// unique key when declared, by equality over the set scalar fields
/// otherwise. A child providing neither is a schema error.
pub(crate) fn persist_record<'a>(
    conn: &'a mut SqliteConnection,
    registry: &'a TableRegistry,
    table: &'a str,
    data: &'a RecordData,
    nested: bool,
) -> BoxFuture<'a, Result<i64>> {
    Box::pin(async move {
        let schema = data.schema;
        let scalars = data.scalar_pairs();
        let unique = registry.effective_unique(table, schema);

        let rowid = if scalars.is_empty() {
            if nested {
                return Err(Error::Schema(format!(
                    "cannot persist nested {table} record: no set fields to identify it by"
                )));
            }
            insert_row(&mut *conn, table, &scalars).await?
        } else if !unique.is_empty() {
            let columns: Vec<&str> = scalars.iter().map(|(c, _)| *c).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            let setters: Vec<String> = columns
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders}) \
                 ON CONFLICT DO UPDATE SET {} RETURNING _id",
                columns.join(", "),
                setters.join(", ")
            );
            trace!(table, sql = sql.as_str(), "upsert");

            let mut query = sqlx::query(&sql);
            for (_, value) in &scalars {
                query = bind_value(query, value.clone());
            }
            let row = query.fetch_one(&mut *conn).await?;
            row.try_get::<i64, _>(0)?
        } else if nested {
            let mut state = QueryState::default();
            for (column, value) in &scalars {
                state.conditions.push(Condition::Eq {
                    column: column.to_string(),
                    value: value.clone(),
                });
            }
            let (where_sql, params) = state.where_clause();
            let sql = format!("SELECT _id FROM {table}{where_sql} LIMIT 1");
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_value(query, param);
            }
            match query.fetch_optional(&mut *conn).await? {
                Some(row) => row.try_get::<i64, _>(0)?,
                None => insert_row(&mut *conn, table, &scalars).await?,
            }
        } else {
            insert_row(&mut *conn, table, &scalars).await?
        };

        let key = rowid.to_string();
        for (_, def, value) in data.relation_entries() {
            reconcile_field(&mut *conn, registry, table, &key, def, value).await?;
        }

        Ok(rowid)
    })
}

/// Bring the stored link set for one relation field in line with the new
/// field value, persisting new children and releasing vanished ones.
pub(crate) fn reconcile_field<'a>(
    conn: &'a mut SqliteConnection,
    registry: &'a TableRegistry,
    parent_table: &'a str,
    parent_key: &'a str,
    def: &'a FieldDef,
    value: &'a FieldValue,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let desired: Vec<&RecordData> = match value {
            FieldValue::Nested(None) => Vec::new(),
            FieldValue::Nested(Some(child)) => vec![child.as_ref()],
            FieldValue::List(children) => children.iter().collect(),
            FieldValue::Scalar(_) | FieldValue::Unset => return Ok(()),
        };

        let existing = fetch_links(&mut *conn, parent_table, parent_key, Some(def.name)).await?;

        // Children first, so their keys exist before any link points at them.
        // A duplicate child within one list collapses into a single link
        // carrying the occurrence count.
        let mut new_links: Vec<(&'static str, i64, i64, i64)> = Vec::new();
        for (seq, child) in desired.iter().enumerate() {
            let child_table = child.schema.name;
            let child_key =
                persist_record(&mut *conn, registry, child_table, child, true).await?;
            match new_links
                .iter_mut()
                .find(|(t, k, _, _)| *t == child_table && *k == child_key)
            {
                Some(link) => link.3 += 1,
                None => new_links.push((child_table, child_key, seq as i64, 1)),
            }
        }

        for (child_table, child_key, seq, refcount) in &new_links {
            let sql = format!(
                "INSERT INTO {LINKS_TABLE} \
                 (parent_table, parent_key, field_name, child_table, child_key, seq, refcount) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (parent_table, parent_key, field_name, child_table, child_key) \
                 DO UPDATE SET seq = excluded.seq, refcount = excluded.refcount"
            );
            sqlx::query(&sql)
                .bind(parent_table)
                .bind(parent_key)
                .bind(def.name)
                .bind(*child_table)
                .bind(child_key.to_string())
                .bind(*seq)
                .bind(*refcount)
                .execute(&mut *conn)
                .await?;
        }

        for link in &existing {
            let kept = new_links
                .iter()
                .any(|(t, k, _, _)| *t == link.child_table.as_str() && *k == link.child_key);
            if kept {
                continue;
            }
            let sql = format!(
                "DELETE FROM {LINKS_TABLE} WHERE parent_table = ? AND parent_key = ? \
                 AND field_name = ? AND child_table = ? AND child_key = ?"
            );
            sqlx::query(&sql)
                .bind(parent_table)
                .bind(parent_key)
                .bind(def.name)
                .bind(&link.child_table)
                .bind(link.child_key.to_string())
                .execute(&mut *conn)
                .await?;
            release_if_orphaned(&mut *conn, &link.child_table, link.child_key).await?;
        }

        Ok(())
    })
}

/// Delete the child row once no link references it any more.
fn release_if_orphaned<'a>(
    conn: &'a mut SqliteConnection,
    child_table: &'a str,
    child_key: i64,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let sql =
            format!("SELECT COUNT(*) FROM {LINKS_TABLE} WHERE child_table = ? AND child_key = ?");
        let row = sqlx::query(&sql)
            .bind(child_table)
            .bind(child_key.to_string())
            .fetch_one(&mut *conn)
            .await?;
        let remaining: i64 = row.try_get(0)?;
        if remaining == 0 {
            debug!(table = child_table, key = child_key, "removing orphaned row");
            delete_row(&mut *conn, child_table, child_key).await?;
        }
        Ok(())
    })
}

/// Remove one row together with its link entries, cascading to children
/// whose last reference this removes.
pub(crate) fn delete_row<'a>(
    conn: &'a mut SqliteConnection,
    table: &'a str,
    key: i64,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let key_text = key.to_string();
        let children = fetch_links(&mut *conn, table, &key_text, None).await?;

        let sql = format!("DELETE FROM {LINKS_TABLE} WHERE parent_table = ? AND parent_key = ?");
        sqlx::query(&sql)
            .bind(table)
            .bind(&key_text)
            .execute(&mut *conn)
            .await?;

        for link in &children {
            release_if_orphaned(&mut *conn, &link.child_table, link.child_key).await?;
        }

        // Links in which this row is the child would dangle once the row is
        // gone; drop them as well.
        let sql = format!("DELETE FROM {LINKS_TABLE} WHERE child_table = ? AND child_key = ?");
        sqlx::query(&sql)
            .bind(table)
            .bind(&key_text)
            .execute(&mut *conn)
            .await?;

        let sql = format!("DELETE FROM {table} WHERE _id = ?");
        sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
        Ok(())
    })
}

/// Build the dynamic record form from one fetched row's scalar columns.
/// Relation fields stay unset; `load_relations` fills them.
pub(crate) fn data_from_row(schema: &'static Schema, row: &SqliteRow) -> Result<RecordData> {
    let mut data = RecordData::new(schema);
    for (i, def) in schema.fields.iter().enumerate() {
        if def.is_relation() {
            continue;
        }
        data.fields[i] = FieldValue::Scalar(value_from_row(row, def.name, def.semantic)?);
    }
    Ok(data)
}

/// Hydrate every relation field of `data` from the link set of the given
/// row. `visited` tracks the `(table, key)` path; re-entry is a cycle.
pub(crate) fn load_relations<'a>(
    conn: &'a mut SqliteConnection,
    table: &'a str,
    key: i64,
    data: &'a mut RecordData,
    visited: &'a mut Vec<(String, i64)>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let key_text = key.to_string();
        let schema = data.schema;
        for (i, def) in schema.fields.iter().enumerate() {
            if !def.is_relation() {
                continue;
            }
            let child_schema = def.child_schema()?;
            let links = fetch_links(&mut *conn, table, &key_text, Some(def.name)).await?;
            match def.semantic {
                SemanticType::Nested => {
                    data.fields[i] = match links.first() {
                        Some(link) => FieldValue::Nested(Some(Box::new(
                            load_child(&mut *conn, child_schema, link.child_key, visited)
                                .await?,
                        ))),
                        None => FieldValue::Nested(None),
                    };
                }
                SemanticType::List => {
                    let mut items = Vec::with_capacity(links.len());
                    for link in &links {
                        items.push(
                            load_child(&mut *conn, child_schema, link.child_key, visited)
                                .await?,
                        );
                    }
                    data.fields[i] = FieldValue::List(items);
                }
                _ => {}
            }
        }
        Ok(())
    })
}

fn load_child<'a>(
    conn: &'a mut SqliteConnection,
    schema: &'static Schema,
    key: i64,
    visited: &'a mut Vec<(String, i64)>,
) -> BoxFuture<'a, Result<RecordData>> {
    Box::pin(async move {
        if visited.iter().any(|(t, k)| t == schema.name && *k == key) {
            return Err(Error::Cycle {
                table: schema.name.to_string(),
                key,
            });
        }
        visited.push((schema.name.to_string(), key));

        let sql = format!(
            "SELECT {} FROM {} WHERE _id = ?",
            schema.select_list(),
            schema.name
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| Error::NotFound {
                table: schema.name.to_string(),
            })?;

        let mut data = data_from_row(schema, &row)?;
        if schema.has_relations() {
            load_relations(&mut *conn, schema.name, key, &mut data, visited).await?;
        }

        visited.pop();
        Ok(data)
    })
}
