//! FILENAME: engine/src/config.rs
//! PURPOSE: Process-wide immutable engine configuration.
//! CONTEXT: Loaded (or defaulted) once at startup by the orchestration
//! layer and passed by reference into every generation call. Concurrent
//! calls share it read-only; nothing in the engine mutates it.

use crate::field::DataKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunable tables and thresholds for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target document grammar version.
    pub document_version: String,
    /// Build string stamped into the workbook header.
    pub build_version: String,

    /// Native type name (lowercased) -> canonical kind.
    /// Unknown names fall back to `string`.
    pub type_map: BTreeMap<String, DataKind>,

    /// Direct aggregate function names.
    pub aggregate_functions: Vec<String>,
    /// Window/ranking functions that make a calculation a table calc.
    pub table_calc_functions: Vec<String>,

    /// Distinct-value count at or below which a flagged numeric column
    /// is accepted as a dimension.
    pub low_cardinality_threshold: usize,
    /// Null ratio above which a column draws a data-quality warning.
    pub null_warning_ratio: f64,
    /// Distinct-value count above which a text column draws a warning.
    pub high_cardinality_threshold: usize,
    /// Column count above which the schema draws a single width warning.
    pub wide_schema_threshold: usize,

    /// Dashboard canvas size in pixels.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Height of the KPI band on executive dashboards.
    pub kpi_band_height: u32,
    /// Chart capacity of one detailed-grid page.
    pub max_charts_per_page: usize,
    /// Small-multiple zones beside the dominant zone on operational pages.
    pub operational_small_zones: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            document_version: "2023.3".to_string(),
            build_version: "20233.23.0322.1437".to_string(),
            type_map: default_type_map(),
            aggregate_functions: to_strings(&["SUM", "AVG", "COUNT", "MIN", "MAX", "COUNTD"]),
            table_calc_functions: to_strings(&[
                "WINDOW_SUM",
                "WINDOW_AVG",
                "WINDOW_MIN",
                "WINDOW_MAX",
                "RUNNING_SUM",
                "RUNNING_AVG",
                "RUNNING_COUNT",
                "RANK",
                "RANK_DENSE",
                "RANK_UNIQUE",
                "INDEX",
                "FIRST",
                "LAST",
                "LOOKUP",
                "TOTAL",
                "PREVIOUS_VALUE",
            ]),
            low_cardinality_threshold: 12,
            null_warning_ratio: 0.3,
            high_cardinality_threshold: 100,
            wide_schema_threshold: 50,
            canvas_width: 1200,
            canvas_height: 800,
            kpi_band_height: 160,
            max_charts_per_page: 12,
            operational_small_zones: 6,
        }
    }
}

impl EngineConfig {
    /// Resolves a native type name to its canonical kind.
    pub fn resolve_kind(&self, native_type: &str) -> DataKind {
        let key = native_type.trim().to_ascii_lowercase();
        match self.type_map.get(&key) {
            Some(kind) => *kind,
            None => {
                tracing::debug!(native = %native_type, "unknown native type, treating as string");
                DataKind::String
            }
        }
    }
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_type_map() -> BTreeMap<String, DataKind> {
    let entries: [(&str, DataKind); 26] = [
        ("int", DataKind::Integer),
        ("int8", DataKind::Integer),
        ("int16", DataKind::Integer),
        ("int32", DataKind::Integer),
        ("int64", DataKind::Integer),
        ("integer", DataKind::Integer),
        ("bigint", DataKind::Integer),
        ("smallint", DataKind::Integer),
        ("float", DataKind::Float),
        ("float32", DataKind::Float),
        ("float64", DataKind::Float),
        ("double", DataKind::Float),
        ("real", DataKind::Float),
        ("decimal", DataKind::Float),
        ("numeric", DataKind::Float),
        ("str", DataKind::String),
        ("string", DataKind::String),
        ("object", DataKind::String),
        ("text", DataKind::String),
        ("varchar", DataKind::String),
        ("category", DataKind::String),
        ("categorical", DataKind::String),
        ("bool", DataKind::Boolean),
        ("boolean", DataKind::Boolean),
        ("date", DataKind::Date),
        ("datetime", DataKind::Datetime),
    ];
    let mut map = BTreeMap::new();
    for (name, kind) in entries {
        map.insert(name.to_string(), kind);
    }
    // Pandas-style timestamp spellings
    map.insert("datetime64".to_string(), DataKind::Datetime);
    map.insert("datetime64[ns]".to_string(), DataKind::Datetime);
    map.insert("timestamp".to_string(), DataKind::Datetime);
    map
}
