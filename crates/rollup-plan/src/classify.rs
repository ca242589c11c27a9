//! Derives the dimension/numeric/nonnumeric column sets a rollup plan is
//! built from, and decides which of them actually get projected once the
//! target schema is known.

use std::collections::HashSet;

use rollup_schemas::{ColumnInfo, DimensionConfig, SemanticType};

/// Columns that are never eligible as a dimension, numeric, or nonnumeric
/// aggregate input — they already have a fixed meaning in the rollup row.
const RESERVED_NAMES: [&str; 3] = ["timestamp", "last_updated_at", "rollup_count"];
const RESERVED_PREFIXES: [&str; 3] = ["min_", "max_", "avg_"];

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name) || RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Source-side column classification for one (source, dimension-config) pair.
#[derive(Debug, Clone, Default)]
pub struct SourceClassification {
    pub dimensions: Vec<String>,
    pub numeric: Vec<ColumnInfo>,
    pub nonnumeric: Vec<ColumnInfo>,
}

/// Classify the columns of a source table against its declared dimensions.
///
/// Dimensions declared but absent from the introspected source columns are
/// reported separately so the caller can log them without aborting the run.
pub fn classify_source(
    source_columns: &[ColumnInfo],
    declared_dimensions: &[DimensionConfig],
) -> (SourceClassification, Vec<String>) {
    let source_names: HashSet<&str> = source_columns.iter().map(|c| c.name.as_str()).collect();

    let mut dimensions = Vec::new();
    let mut missing_dimensions = Vec::new();
    for dim in declared_dimensions {
        if !dim.is_active {
            continue;
        }
        if source_names.contains(dim.dimension_column.as_str()) {
            dimensions.push(dim.dimension_column.clone());
        } else {
            missing_dimensions.push(dim.dimension_column.clone());
        }
    }
    let dimension_set: HashSet<&str> = dimensions.iter().map(|s| s.as_str()).collect();

    let mut numeric = Vec::new();
    let mut nonnumeric = Vec::new();
    for col in source_columns {
        if is_reserved(&col.name) || dimension_set.contains(col.name.as_str()) {
            continue;
        }
        match col.semantic_type {
            SemanticType::Numeric => numeric.push(col.clone()),
            SemanticType::Timestamp => {}
            SemanticType::Json | SemanticType::Other => {
                if col.name != "last_updated_at" && col.name != "rollup_count" {
                    nonnumeric.push(col.clone())
                }
            }
        }
    }

    (
        SourceClassification {
            dimensions,
            numeric,
            nonnumeric,
        },
        missing_dimensions,
    )
}

/// A numeric source column kept in the plan, once the min/max/avg triplet
/// has been confirmed present on the target.
#[derive(Debug, Clone)]
pub struct KeptNumeric {
    pub source_column: String,
}

/// A nonnumeric (JSON or other) source column kept in the plan, once its
/// verbatim presence on the target has been confirmed.
#[derive(Debug, Clone)]
pub struct KeptNonNumeric {
    pub source_column: String,
    pub semantic_type: SemanticType,
}

/// Result of filtering a source classification against the target schema.
#[derive(Debug, Clone, Default)]
pub struct ProjectedColumns {
    pub numeric: Vec<KeptNumeric>,
    pub nonnumeric: Vec<KeptNonNumeric>,
}

/// A numeric column `x` is only projected if the target has all three of
/// `min_x`, `max_x`, `avg_x`. A nonnumeric column is only projected if it
/// also exists on the target under its own name.
pub fn project_against_target(
    classification: &SourceClassification,
    target_columns: &[ColumnInfo],
) -> ProjectedColumns {
    let target_names: HashSet<&str> = target_columns.iter().map(|c| c.name.as_str()).collect();

    let numeric = classification
        .numeric
        .iter()
        .filter(|col| {
            target_names.contains(format!("min_{}", col.name).as_str())
                && target_names.contains(format!("max_{}", col.name).as_str())
                && target_names.contains(format!("avg_{}", col.name).as_str())
        })
        .map(|col| KeptNumeric {
            source_column: col.name.clone(),
        })
        .collect();

    let nonnumeric = classification
        .nonnumeric
        .iter()
        .filter(|col| target_names.contains(col.name.as_str()))
        .map(|col| KeptNonNumeric {
            source_column: col.name.clone(),
            semantic_type: col.semantic_type,
        })
        .collect();

    ProjectedColumns { numeric, nonnumeric }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: SemanticType) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            semantic_type: ty,
            pg_type: "text".to_string(),
        }
    }

    fn dim(name: &str, active: bool) -> DimensionConfig {
        DimensionConfig {
            id: uuid::Uuid::new_v4(),
            source_table: "raw.metrics".to_string(),
            dimension_column: name.to_string(),
            is_active: active,
        }
    }

    #[test]
    fn separates_dimensions_numeric_nonnumeric_and_skips_reserved() {
        let source = vec![
            col("timestamp", SemanticType::Timestamp),
            col("tenant", SemanticType::Other),
            col("value", SemanticType::Numeric),
            col("min_value", SemanticType::Numeric),
            col("rollup_count", SemanticType::Numeric),
            col("last_updated_at", SemanticType::Timestamp),
            col("payload", SemanticType::Json),
        ];
        let dims = vec![dim("tenant", true)];

        let (classified, missing) = classify_source(&source, &dims);

        assert!(missing.is_empty());
        assert_eq!(classified.dimensions, vec!["tenant".to_string()]);
        assert_eq!(classified.numeric.len(), 1);
        assert_eq!(classified.numeric[0].name, "value");
        assert_eq!(classified.nonnumeric.len(), 1);
        assert_eq!(classified.nonnumeric[0].name, "payload");
    }

    #[test]
    fn missing_declared_dimension_is_reported_not_fatal() {
        let source = vec![col("timestamp", SemanticType::Timestamp)];
        let dims = vec![dim("region", true)];

        let (classified, missing) = classify_source(&source, &dims);

        assert!(classified.dimensions.is_empty());
        assert_eq!(missing, vec!["region".to_string()]);
    }

    #[test]
    fn inactive_dimension_is_ignored() {
        let source = vec![col("tenant", SemanticType::Other)];
        let dims = vec![dim("tenant", false)];

        let (classified, missing) = classify_source(&source, &dims);

        assert!(classified.dimensions.is_empty());
        assert!(missing.is_empty());
    }

    #[test]
    fn numeric_column_requires_full_min_max_avg_triplet_on_target() {
        let classification = SourceClassification {
            dimensions: vec![],
            numeric: vec![col("value", SemanticType::Numeric), col("latency", SemanticType::Numeric)],
            nonnumeric: vec![],
        };
        let target = vec![
            col("min_value", SemanticType::Numeric),
            col("max_value", SemanticType::Numeric),
            col("avg_value", SemanticType::Numeric),
            col("min_latency", SemanticType::Numeric),
        ];

        let projected = project_against_target(&classification, &target);

        assert_eq!(projected.numeric.len(), 1);
        assert_eq!(projected.numeric[0].source_column, "value");
    }

    #[test]
    fn nonnumeric_column_requires_presence_on_target() {
        let classification = SourceClassification {
            dimensions: vec![],
            numeric: vec![],
            nonnumeric: vec![col("payload", SemanticType::Json), col("label", SemanticType::Other)],
        };
        let target = vec![col("payload", SemanticType::Json)];

        let projected = project_against_target(&classification, &target);

        assert_eq!(projected.nonnumeric.len(), 1);
        assert_eq!(projected.nonnumeric[0].source_column, "payload");
    }
}
