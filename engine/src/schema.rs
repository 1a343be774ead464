//! FILENAME: engine/src/schema.rs
//! PURPOSE: Normalizes raw column metadata into canonical field definitions.
//! CONTEXT: First stage of every generation call. Maps native type names to
//! canonical kinds, assigns dimension/measure roles, attaches semantic
//! hints, and raises data-quality warnings. Fatal when the dataset is below
//! the minimum size (at least 2 rows, at least 1 column) or when nothing
//! usable survives normalization.

use crate::analysis::RawSchema;
use crate::config::EngineConfig;
use crate::field::{DataKind, FieldDefinition, FieldRole, SemanticHint};
use crate::report::{GenerationReport, Stage};

/// Column names that mark a field as geographic (compared after
/// lowercasing and stripping spaces/underscores).
const GEOGRAPHIC_NAMES: [&str; 14] = [
    "country",
    "region",
    "state",
    "province",
    "city",
    "county",
    "latitude",
    "longitude",
    "lat",
    "lng",
    "lon",
    "postalcode",
    "zip",
    "zipcode",
];

/// Normalizes one raw schema into field definitions.
///
/// Warnings are appended to the report as they arise (duplicate names,
/// quality issues); a fatal entry plus `None` means this dataset cannot
/// participate in generation at all.
pub fn normalize_schema(
    raw: &RawSchema,
    config: &EngineConfig,
    report: &mut GenerationReport,
) -> Option<Vec<FieldDefinition>> {
    if raw.columns.is_empty() {
        report.fatal(
            Stage::Schema,
            format!("dataset '{}' has no columns", raw.name),
        );
        return None;
    }
    if raw.row_count < 2 {
        report.fatal(
            Stage::Schema,
            format!(
                "dataset '{}' has {} row(s); at least 2 are required",
                raw.name, raw.row_count
            ),
        );
        return None;
    }

    let mut fields: Vec<FieldDefinition> = Vec::with_capacity(raw.columns.len());

    for (ordinal, column) in raw.columns.iter().enumerate() {
        let name = column.name.trim();
        if name.is_empty() {
            report.warn(
                Stage::Schema,
                format!("dataset '{}': blank column name skipped", raw.name),
            );
            continue;
        }
        if fields.iter().any(|f| f.name == name) {
            report.warn(
                Stage::Schema,
                format!("dataset '{}': duplicate column '{}' skipped", raw.name, name),
            );
            continue;
        }

        let kind = config.resolve_kind(&column.native_type);
        let role = assign_role(kind, column.force_dimension, column.distinct_values, config);
        let hint = semantic_hint(name, column.distinct_values, raw.row_count);

        fields.push(FieldDefinition {
            name: name.to_string(),
            role,
            data_kind: kind,
            hint,
            contains_null: column.null_count > 0,
            ordinal,
        });

        quality_warnings(raw, column, kind, config, report);
    }

    if fields.is_empty() {
        report.fatal(
            Stage::Schema,
            format!("dataset '{}' has no usable columns", raw.name),
        );
        return None;
    }

    if raw.columns.len() > config.wide_schema_threshold {
        report.warn(
            Stage::Schema,
            format!(
                "dataset '{}' has {} columns; dashboards work best focused on key columns",
                raw.name,
                raw.columns.len()
            ),
        );
    }

    tracing::debug!(
        dataset = %raw.name,
        fields = fields.len(),
        "schema normalized"
    );

    Some(fields)
}

/// Numeric columns default to measures. The explicit dimension flag wins
/// when the column is genuinely low-cardinality (category codes stored as
/// integers); a flagged high-cardinality numeric column stays a measure.
/// Text, dates and booleans are always dimensions.
fn assign_role(
    kind: DataKind,
    force_dimension: bool,
    distinct_values: Option<usize>,
    config: &EngineConfig,
) -> FieldRole {
    if !kind.is_numeric() {
        return FieldRole::Dimension;
    }
    if force_dimension {
        let low_cardinality = distinct_values
            .map(|d| d <= config.low_cardinality_threshold)
            .unwrap_or(true);
        if low_cardinality {
            return FieldRole::Dimension;
        }
    }
    FieldRole::Measure
}

fn semantic_hint(
    name: &str,
    distinct_values: Option<usize>,
    row_count: usize,
) -> Option<SemanticHint> {
    let compact: String = name
        .to_ascii_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '_' && *c != '-')
        .collect();

    if GEOGRAPHIC_NAMES.contains(&compact.as_str()) {
        return Some(SemanticHint::Geographic);
    }
    if compact == "id" || compact.ends_with("id") {
        return Some(SemanticHint::Identifier);
    }
    // A column with one distinct value per row behaves like a key.
    if row_count > 1 && distinct_values == Some(row_count) {
        return Some(SemanticHint::Identifier);
    }
    None
}

fn quality_warnings(
    raw: &RawSchema,
    column: &crate::analysis::RawColumn,
    kind: DataKind,
    config: &EngineConfig,
    report: &mut GenerationReport,
) {
    let null_ratio = column.null_count as f64 / raw.row_count as f64;
    if null_ratio > config.null_warning_ratio {
        report.warn(
            Stage::Schema,
            format!(
                "column '{}' is {:.0}% null",
                column.name,
                null_ratio * 100.0
            ),
        );
    }
    if column.distinct_values == Some(1) {
        report.warn(
            Stage::Schema,
            format!("column '{}' has only one distinct value", column.name),
        );
    }
    if raw.row_count > 1 && column.distinct_values == Some(raw.row_count) {
        report.warn(
            Stage::Schema,
            format!(
                "column '{}' appears to be an identifier; poor fit for chart axes",
                column.name
            ),
        );
    }
    if kind == DataKind::String {
        if let Some(distinct) = column.distinct_values {
            if distinct > config.high_cardinality_threshold {
                report.warn(
                    Stage::Schema,
                    format!(
                        "column '{}' has high cardinality ({} distinct values)",
                        column.name, distinct
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RawColumn;

    fn column(name: &str, native: &str) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            native_type: native.to_string(),
            distinct_values: None,
            null_count: 0,
            force_dimension: false,
        }
    }

    fn schema(columns: Vec<RawColumn>, rows: usize) -> RawSchema {
        RawSchema {
            name: "sales".to_string(),
            row_count: rows,
            columns,
        }
    }

    #[test]
    fn test_roles_follow_types() {
        let mut report = GenerationReport::new();
        let fields = normalize_schema(
            &schema(
                vec![
                    column("Region", "object"),
                    column("Sales", "float64"),
                    column("Units", "int64"),
                    column("Order Date", "datetime64[ns]"),
                ],
                100,
            ),
            &EngineConfig::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(fields[0].role, FieldRole::Dimension);
        assert_eq!(fields[1].role, FieldRole::Measure);
        assert_eq!(fields[2].role, FieldRole::Measure);
        assert_eq!(fields[3].role, FieldRole::Dimension);
        assert_eq!(fields[3].data_kind, DataKind::Datetime);
        assert!(!report.has_fatal());
    }

    #[test]
    fn test_flagged_low_cardinality_numeric_becomes_dimension() {
        let mut report = GenerationReport::new();
        let mut priority = column("Priority", "int64");
        priority.force_dimension = true;
        priority.distinct_values = Some(3);

        let mut big = column("Amount", "int64");
        big.force_dimension = true;
        big.distinct_values = Some(5000);

        let fields = normalize_schema(
            &schema(vec![priority, big], 10_000),
            &EngineConfig::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(fields[0].role, FieldRole::Dimension);
        // Flag ignored: too many distinct values to group by.
        assert_eq!(fields[1].role, FieldRole::Measure);
    }

    #[test]
    fn test_too_few_rows_is_fatal() {
        let mut report = GenerationReport::new();
        let result = normalize_schema(
            &schema(vec![column("A", "int64")], 1),
            &EngineConfig::default(),
            &mut report,
        );
        assert!(result.is_none());
        assert!(report.has_fatal());
    }

    #[test]
    fn test_no_columns_is_fatal() {
        let mut report = GenerationReport::new();
        let result = normalize_schema(&schema(vec![], 100), &EngineConfig::default(), &mut report);
        assert!(result.is_none());
        assert!(report.has_fatal());
    }

    #[test]
    fn test_duplicate_and_blank_columns_skipped_with_warning() {
        let mut report = GenerationReport::new();
        let fields = normalize_schema(
            &schema(
                vec![column("A", "int64"), column("A", "float64"), column("  ", "object")],
                50,
            ),
            &EngineConfig::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(report.warning_count(), 2);
        assert!(!report.has_fatal());
    }

    #[test]
    fn test_semantic_hints() {
        let mut report = GenerationReport::new();
        let mut customer_id = column("Customer ID", "int64");
        customer_id.distinct_values = Some(50);
        let fields = normalize_schema(
            &schema(
                vec![column("Region", "object"), customer_id, column("Sales", "float64")],
                50,
            ),
            &EngineConfig::default(),
            &mut report,
        )
        .unwrap();

        assert_eq!(fields[0].hint, Some(SemanticHint::Geographic));
        assert_eq!(fields[1].hint, Some(SemanticHint::Identifier));
        assert_eq!(fields[2].hint, None);
    }

    #[test]
    fn test_quality_warnings_are_non_fatal() {
        let mut report = GenerationReport::new();
        let mut sparse = column("Notes", "object");
        sparse.null_count = 40;
        sparse.distinct_values = Some(1);

        let fields = normalize_schema(
            &schema(vec![column("Sales", "float64"), sparse], 50),
            &EngineConfig::default(),
            &mut report,
        );
        assert!(fields.is_some());
        assert!(!report.has_fatal());
        // Null ratio + constant column
        assert_eq!(report.warning_count(), 2);
    }
}
