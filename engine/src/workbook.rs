//! FILENAME: engine/src/workbook.rs
//! PURPOSE: The assembled workbook model, read-only once built.
//! CONTEXT: This is the aggregate the serializer consumes: datasources
//! (fields + calculated fields), worksheets (including the text worksheets
//! backing KPI tiles), and dashboard pages. Building it is pure; the same
//! inputs always produce the same model.

use crate::calc::CalculatedField;
use crate::field::FieldDefinition;
use crate::layout::DashboardPage;
use crate::viz::{KpiTile, MarkType, Shelf, ShelfEntry, VisualizationSpec};
use serde::{Deserialize, Serialize};

/// How the datasource connects to its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Data travels inside the packaged archive.
    Embedded,
    /// The document points at an external text file.
    External,
}

/// One datasource: canonical fields plus the calculated-field set.
/// Invalid calculations stay here for reporting; the serializer emits
/// only the valid ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub calculated_fields: Vec<CalculatedField>,
    pub row_count: usize,
    /// Whether embeddable rows exist for this datasource.
    pub has_rows: bool,
}

impl Datasource {
    /// Valid calculations, in build order.
    pub fn valid_calculations(&self) -> impl Iterator<Item = &CalculatedField> {
        self.calculated_fields.iter().filter(|c| c.valid)
    }

    /// True when `name` resolves to a field or a valid calculation.
    pub fn resolves(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
            || self.calculated_fields.iter().any(|c| c.valid && c.name == name)
    }
}

/// One worksheet bound to a datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worksheet {
    pub spec: VisualizationSpec,
    /// Name of the datasource the worksheet reads from.
    pub datasource: String,
}

/// The aggregate root handed to the serializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub name: String,
    pub datasources: Vec<Datasource>,
    pub worksheets: Vec<Worksheet>,
    pub dashboards: Vec<DashboardPage>,
    pub kpi_tiles: Vec<KpiTile>,
}

/// Builds the small text worksheet that backs a KPI tile: the bound
/// calculation on the label shelf, nothing else.
pub fn kpi_worksheet(tile: &KpiTile, datasource: &str) -> Worksheet {
    Worksheet {
        spec: VisualizationSpec {
            name: tile.name.clone(),
            title: tile.name.clone(),
            mark: MarkType::Text,
            shelves: vec![(
                Shelf::Label,
                vec![ShelfEntry {
                    field: tile.binding.clone(),
                    aggregation: None,
                }],
            )],
            priority: 0.0,
        },
        datasource: datasource.to_string(),
    }
}
