//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the workbook generation engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.
//! The engine owns everything between raw analysis input and the
//! assembled workbook model; document serialization and packaging live
//! in the persistence and format crates.

pub mod analysis;
pub mod calc;
pub mod config;
pub mod field;
pub mod layout;
pub mod report;
pub mod schema;
pub mod viz;
pub mod workbook;

// Re-export commonly used types at the crate root
pub use analysis::{
    AnalysisInput, CalculationSuggestion, KpiDefinition, RawColumn, RawSchema, TabularDataset,
    VizRecommendation,
};
pub use calc::{build_calculated_fields, CalculatedField, CalculationKind};
pub use config::EngineConfig;
pub use field::{DataKind, DataValue, FieldDefinition, FieldRole, SemanticHint};
pub use layout::{lay_out_dashboards, DashboardPage, DashboardStyle, Rect, Zone, ZoneItem};
pub use report::{GenerationReport, ReportEntry, Stage, Summary};
pub use schema::normalize_schema;
pub use viz::{
    map_visualizations, Aggregation, KpiTile, MarkType, Shelf, ShelfEntry, VisualizationSpec,
    VizKind,
};
pub use workbook::{kpi_worksheet, ConnectionMode, Datasource, Workbook, Worksheet};
