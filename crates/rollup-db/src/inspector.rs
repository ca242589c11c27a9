//! Schema introspection.
//!
//! Introspects columns of a source/target table from `information_schema`
//! and classifies each into the semantic types the plan builder needs.
//! Results for a single orchestrator invocation are cached in
//! [`SchemaCache`] so a multi-config run never re-introspects the same
//! table twice.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rollup_schemas::{ColumnInfo, SemanticType};
use sqlx::{PgPool, Row};

/// Split a possibly-qualified table name (`"schema"."table"` or `table`)
/// into `(schema, table)`, defaulting the schema to `public`.
pub fn split_qualified(qualified: &str) -> (String, String) {
    match qualified.split_once('.') {
        Some((schema, table)) => (schema.to_string(), table.to_string()),
        None => ("public".to_string(), qualified.to_string()),
    }
}

/// Classify a Postgres `information_schema.columns.data_type` string.
pub fn classify_data_type(data_type: &str) -> SemanticType {
    match data_type {
        "timestamp without time zone" | "timestamp with time zone" | "date" => {
            SemanticType::Timestamp
        }
        "smallint" | "integer" | "bigint" | "numeric" | "decimal" | "real"
        | "double precision" => SemanticType::Numeric,
        "json" | "jsonb" => SemanticType::Json,
        _ => SemanticType::Other,
    }
}

/// Introspect the ordered column list of a qualified table.
pub async fn introspect_columns(pool: &PgPool, qualified_table: &str) -> Result<Vec<ColumnInfo>> {
    let (schema, table) = split_qualified(qualified_table);

    let rows = sqlx::query(
        r#"
        select column_name, data_type
        from information_schema.columns
        where table_schema = $1 and table_name = $2
        order by ordinal_position
        "#,
    )
    .bind(&schema)
    .bind(&table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("introspect_columns failed for {qualified_table}"))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        out.push(ColumnInfo {
            name,
            semantic_type: classify_data_type(&data_type),
            pg_type: data_type,
        });
    }
    Ok(out)
}

/// Size and row-count estimate for a relation, used to size chunk
/// intervals. `reltuples` is a planner estimate, not an exact count, but
/// that's a fine tradeoff for a sizing heuristic that just rounds to the
/// nearest of a handful of candidate intervals.
pub struct RelationStats {
    pub total_bytes: u64,
    pub estimated_rows: u64,
}

pub async fn relation_stats(pool: &PgPool, qualified_table: &str) -> Result<Option<RelationStats>> {
    let (schema, table) = split_qualified(qualified_table);

    let row = sqlx::query(
        r#"
        select
            pg_total_relation_size(c.oid) as total_bytes,
            greatest(c.reltuples, 0)::bigint as estimated_rows
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1 and c.relname = $2
        "#,
    )
    .bind(&schema)
    .bind(&table)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("relation_stats failed for {qualified_table}"))?;

    Ok(match row {
        Some(row) => Some(RelationStats {
            total_bytes: row.try_get::<i64, _>("total_bytes")? as u64,
            estimated_rows: row.try_get::<i64, _>("estimated_rows")? as u64,
        }),
        None => None,
    })
}

/// Qualified names of the child partitions attached to a partitioned
/// parent table, via `pg_inherits`. Empty when the table isn't partitioned
/// or doesn't exist.
pub async fn list_partitions(pool: &PgPool, qualified_table: &str) -> Result<Vec<String>> {
    let (schema, table) = split_qualified(qualified_table);

    let rows = sqlx::query(
        r#"
        select child_ns.nspname as child_schema, child.relname as child_name
        from pg_inherits
        join pg_class parent on pg_inherits.inhparent = parent.oid
        join pg_namespace parent_ns on parent.relnamespace = parent_ns.oid
        join pg_class child on pg_inherits.inhrelid = child.oid
        join pg_namespace child_ns on child.relnamespace = child_ns.oid
        where parent_ns.nspname = $1 and parent.relname = $2
        order by child_name
        "#,
    )
    .bind(&schema)
    .bind(&table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("list_partitions failed for {qualified_table}"))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let child_schema: String = row.try_get("child_schema")?;
        let child_name: String = row.try_get("child_name")?;
        out.push(format!("{child_schema}.{child_name}"));
    }
    Ok(out)
}

/// Per-invocation cache of introspected columns, keyed by qualified table
/// name.
#[derive(Default)]
pub struct SchemaCache {
    cache: HashMap<String, Vec<ColumnInfo>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached columns for `qualified_table`, introspecting and
    /// populating the cache on first access.
    pub async fn get_or_fetch(
        &mut self,
        pool: &PgPool,
        qualified_table: &str,
    ) -> Result<&[ColumnInfo]> {
        if !self.cache.contains_key(qualified_table) {
            let cols = introspect_columns(pool, qualified_table).await?;
            self.cache.insert(qualified_table.to_string(), cols);
        }
        Ok(self.cache.get(qualified_table).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_schema_and_table() {
        assert_eq!(
            split_qualified("raw.metrics"),
            ("raw".to_string(), "metrics".to_string())
        );
    }

    #[test]
    fn defaults_to_public_schema() {
        assert_eq!(
            split_qualified("metrics"),
            ("public".to_string(), "metrics".to_string())
        );
    }

    #[test]
    fn classifies_known_types() {
        assert_eq!(
            classify_data_type("timestamp with time zone"),
            SemanticType::Timestamp
        );
        assert_eq!(classify_data_type("bigint"), SemanticType::Numeric);
        assert_eq!(classify_data_type("jsonb"), SemanticType::Json);
        assert_eq!(classify_data_type("text"), SemanticType::Other);
    }
}
