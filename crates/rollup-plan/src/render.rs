//! Renders a single parameterised `INSERT ... SELECT ... GROUP BY ...
//! ON CONFLICT` statement from a column classification and a time window.
//!
//! All identifiers are quoted via [`quote_ident`] and only ever sourced
//! from introspection results or configuration, never from free-form
//! caller input. Window bounds are left as bind placeholders (`$1`, `$2`);
//! the rollup interval is inlined as a literal `make_interval(...)` call,
//! which is safe because it comes from trusted configuration, not from a
//! column name.

use chrono::Duration;
use rollup_schemas::SemanticType;

use crate::classify::{KeptNonNumeric, KeptNumeric};

/// Double-quote a single SQL identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a `schema.table` or bare `table` name, quoting each part.
pub fn quote_qualified(qualified: &str) -> String {
    match qualified.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(qualified),
    }
}

/// A fully rendered rollup statement plus the metadata the orchestrator
/// needs to decide whether the plan is degenerate and whether the run is
/// worth attempting at all.
#[derive(Debug, Clone)]
pub struct RollupPlan {
    pub sql: String,
    pub dimensions: Vec<String>,
    pub kept_numeric: Vec<String>,
    pub kept_nonnumeric: Vec<String>,
}

impl RollupPlan {
    /// No dimensions and no aggregated columns: the statement would only
    /// ever produce `rollup_count`/`last_updated_at` rows with nothing to
    /// group or aggregate over.
    pub fn is_degenerate(&self) -> bool {
        self.dimensions.is_empty() && self.kept_numeric.is_empty() && self.kept_nonnumeric.is_empty()
    }
}

fn interval_literal(interval: Duration) -> String {
    format!("make_interval(secs => {})", interval.num_seconds())
}

/// Render the INSERT/SELECT/GROUP BY/ON CONFLICT statement for one
/// (source, target, window) combination.
///
/// `start`/`end` are bound as `$1`/`$2`; the caller binds the matching
/// `DateTime<Utc>` values when executing.
pub fn render_plan(
    source_table: &str,
    target_table: &str,
    rollup_interval: Duration,
    dimensions: &[String],
    numeric: &[KeptNumeric],
    nonnumeric: &[KeptNonNumeric],
) -> RollupPlan {
    let source = quote_qualified(source_table);
    let target = quote_qualified(target_table);
    let bucket = format!(
        "time_bucket({}, {})",
        interval_literal(rollup_interval),
        quote_ident("timestamp")
    );

    let dim_idents: Vec<String> = dimensions.iter().map(|d| quote_ident(d)).collect();

    let mut insert_cols: Vec<String> = vec![quote_ident("timestamp")];
    insert_cols.extend(dim_idents.iter().cloned());

    let mut select_exprs: Vec<String> = vec![bucket.clone()];
    select_exprs.extend(dim_idents.iter().cloned());

    let mut non_key_cols: Vec<String> = Vec::new();

    for n in numeric {
        let min_col = format!("min_{}", n.source_column);
        let max_col = format!("max_{}", n.source_column);
        let avg_col = format!("avg_{}", n.source_column);
        let source_ident = quote_ident(&n.source_column);

        insert_cols.push(quote_ident(&min_col));
        insert_cols.push(quote_ident(&max_col));
        insert_cols.push(quote_ident(&avg_col));

        select_exprs.push(format!("MIN({source_ident})"));
        select_exprs.push(format!("MAX({source_ident})"));
        select_exprs.push(format!("AVG({source_ident})"));

        non_key_cols.push(min_col);
        non_key_cols.push(max_col);
        non_key_cols.push(avg_col);
    }

    for nn in nonnumeric {
        let ident = quote_ident(&nn.source_column);
        insert_cols.push(ident.clone());
        select_exprs.push(match nn.semantic_type {
            SemanticType::Json => format!("array_agg({ident})"),
            _ => format!("MODE() WITHIN GROUP (ORDER BY {ident})"),
        });
        non_key_cols.push(nn.source_column.clone());
    }

    insert_cols.push(quote_ident("rollup_count"));
    insert_cols.push(quote_ident("last_updated_at"));
    select_exprs.push("COUNT(*)".to_string());
    select_exprs.push("NOW()".to_string());
    non_key_cols.push("rollup_count".to_string());
    non_key_cols.push("last_updated_at".to_string());

    let group_by: Vec<String> = std::iter::once(bucket).chain(dim_idents.iter().cloned()).collect();

    let conflict_target = if dim_idents.is_empty() {
        quote_ident("timestamp")
    } else {
        std::iter::once(quote_ident("timestamp"))
            .chain(dim_idents.iter().cloned())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let conflict_action = if non_key_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = non_key_cols
            .iter()
            .map(|c| {
                let ident = quote_ident(c);
                format!("{ident} = EXCLUDED.{ident}")
            })
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    let sql = format!(
        "INSERT INTO {target} ({insert_cols})\nSELECT {select_exprs}\nFROM {source}\nWHERE {ts} >= $1 AND {ts} < $2\nGROUP BY {group_by}\nON CONFLICT ({conflict_target}) {conflict_action}",
        insert_cols = insert_cols.join(", "),
        select_exprs = select_exprs.join(", "),
        ts = quote_ident("timestamp"),
        group_by = group_by.join(", "),
    );

    RollupPlan {
        sql,
        dimensions: dimensions.to_vec(),
        kept_numeric: numeric.iter().map(|n| n.source_column.clone()).collect(),
        kept_nonnumeric: nonnumeric.iter().map(|n| n.source_column.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{KeptNonNumeric, KeptNumeric};

    #[test]
    fn quotes_and_escapes_identifiers() {
        assert_eq!(quote_ident("tenant"), "\"tenant\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
        assert_eq!(quote_qualified("gold.metrics_1h"), "\"gold\".\"metrics_1h\"");
        assert_eq!(quote_qualified("metrics"), "\"metrics\"");
    }

    #[test]
    fn zero_dimensions_collapses_conflict_target_to_timestamp() {
        let plan = render_plan(
            "raw.metrics",
            "gold.metrics_1h",
            Duration::hours(1),
            &[],
            &[KeptNumeric {
                source_column: "value".to_string(),
            }],
            &[],
        );
        assert!(plan.sql.contains("ON CONFLICT (\"timestamp\")"));
        assert!(!plan.is_degenerate());
    }

    #[test]
    fn no_non_key_columns_collapses_to_do_nothing() {
        let plan = render_plan("raw.metrics", "gold.metrics_1h", Duration::hours(1), &[], &[], &[]);
        assert!(plan.sql.contains("DO NOTHING"));
        assert!(plan.is_degenerate());
    }

    #[test]
    fn dimension_order_is_consistent_across_group_by_insert_and_conflict_target() {
        let dims = vec!["tenant".to_string(), "region".to_string()];
        let plan = render_plan(
            "raw.metrics",
            "gold.metrics_1h",
            Duration::hours(1),
            &dims,
            &[],
            &[KeptNonNumeric {
                source_column: "label".to_string(),
                semantic_type: SemanticType::Other,
            }],
        );

        assert!(plan.sql.contains("INSERT INTO \"gold\".\"metrics_1h\" (\"timestamp\", \"tenant\", \"region\""));
        assert!(plan.sql.contains("GROUP BY time_bucket(make_interval(secs => 3600), \"timestamp\"), \"tenant\", \"region\""));
        assert!(plan.sql.contains("ON CONFLICT (\"timestamp\", \"tenant\", \"region\")"));
        assert!(plan.sql.contains("MODE() WITHIN GROUP (ORDER BY \"label\")"));
        assert!(!plan.is_degenerate());
    }

    #[test]
    fn json_column_uses_array_agg() {
        let plan = render_plan(
            "raw.metrics",
            "gold.metrics_1h",
            Duration::hours(1),
            &[],
            &[],
            &[KeptNonNumeric {
                source_column: "payload".to_string(),
                semantic_type: SemanticType::Json,
            }],
        );
        assert!(plan.sql.contains("array_agg(\"payload\")"));
    }
}
