//! FILENAME: engine/src/analysis.rs
//! PURPOSE: The input contract handed over by the upstream analysis stage.
//! CONTEXT: The engine exposes one pure operation over this input; how the
//! KPIs, formulas and recommendations were produced (AI, user edits, both)
//! is invisible here. Everything derives serde so the orchestration layer
//! can pass JSON payloads straight through.

use crate::field::DataValue;
use crate::layout::DashboardStyle;
use crate::viz::{Aggregation, VizKind};
use serde::{Deserialize, Serialize};

/// A raw column as described by the uploaded dataset's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    /// Source-side type name ("int64", "object", "datetime64[ns]", ...).
    pub native_type: String,
    #[serde(default)]
    pub distinct_values: Option<usize>,
    #[serde(default)]
    pub null_count: usize,
    /// Explicit override: treat a low-cardinality numeric column as a
    /// grouping dimension rather than a measure.
    #[serde(default)]
    pub force_dimension: bool,
}

/// Raw schema metadata for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSchema {
    pub name: String,
    /// Declared total row count of the source (the embedded rows may be
    /// a sample of this).
    pub row_count: usize,
    pub columns: Vec<RawColumn>,
}

/// One dataset: schema metadata plus the rows available for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularDataset {
    pub schema: RawSchema,
    /// Row-major values; row width must match the column count.
    #[serde(default)]
    pub rows: Vec<Vec<DataValue>>,
}

/// A calculated-field suggestion: name plus raw formula text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationSuggestion {
    pub name: String,
    pub formula: String,
}

/// A KPI to surface as a tile on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Calculation formula; goes through the same validation as any
    /// other calculated field.
    pub calculation: String,
    /// Number format string, e.g. "#,##0" or "$#,##0.00".
    #[serde(default = "default_number_format")]
    pub number_format: String,
    #[serde(default)]
    pub target_value: Option<f64>,
}

fn default_number_format() -> String {
    "#,##0".to_string()
}

/// A recommended visualization with its field bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizRecommendation {
    pub title: String,
    pub kind: VizKind,
    #[serde(default)]
    pub x_axis: Vec<String>,
    #[serde(default)]
    pub y_axis: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    /// Aggregation applied to measure shelf entries; Sum when absent.
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
    /// Higher scores place earlier on the dashboard. Ties keep the
    /// recommendation order.
    #[serde(default)]
    pub priority: f64,
}

/// Everything the engine needs for one generation call.
///
/// The first dataset is the primary one: calculated fields, KPIs and
/// visualization bindings resolve against its namespace. Additional
/// datasets are normalized, declared and embedded as further datasources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub datasets: Vec<TabularDataset>,
    #[serde(default)]
    pub kpis: Vec<KpiDefinition>,
    #[serde(default)]
    pub calculated_fields: Vec<CalculationSuggestion>,
    #[serde(default)]
    pub visualizations: Vec<VizRecommendation>,
    #[serde(default)]
    pub style: DashboardStyle,
    /// Workbook display name; the primary dataset name when absent.
    #[serde(default)]
    pub workbook_name: Option<String>,
}

impl AnalysisInput {
    pub fn primary_dataset(&self) -> Option<&TabularDataset> {
        self.datasets.first()
    }

    pub fn workbook_name(&self) -> String {
        match &self.workbook_name {
            Some(name) => name.clone(),
            None => match self.datasets.first() {
                Some(ds) => format!("{} Dashboard", ds.schema.name),
                None => "Workbook".to_string(),
            },
        }
    }
}
