//! FILENAME: engine/src/viz.rs
//! PURPOSE: Maps visualization recommendations to worksheet specifications.
//! CONTEXT: Each recommendation names a chart kind and the fields it wants
//! on which axes. The mapper checks that the referenced fields exist and
//! satisfy the kind's role requirements, then produces the mark type and
//! ordered shelf assignment. A recommendation that cannot be satisfied is
//! skipped with a warning; the others still generate.

use crate::analysis::VizRecommendation;
use crate::calc::CalculatedField;
use crate::field::{DataKind, FieldDefinition, FieldRole, SemanticHint};
use crate::report::{GenerationReport, Stage};
use serde::{Deserialize, Serialize};

/// Chart kinds the mapper understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VizKind {
    Bar,
    Line,
    Area,
    Scatter,
    Pie,
    Histogram,
    Heatmap,
    Treemap,
    Map,
    Table,
}

/// The visual primitive a worksheet renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkType {
    Bar,
    Line,
    Area,
    Circle,
    Pie,
    Square,
    Map,
    Text,
    Automatic,
}

impl MarkType {
    /// The mark class name used in the document markup.
    pub fn document_class(self) -> &'static str {
        match self {
            MarkType::Bar => "Bar",
            MarkType::Line => "Line",
            MarkType::Area => "Area",
            MarkType::Circle => "Circle",
            MarkType::Pie => "Pie",
            MarkType::Square => "Square",
            MarkType::Map => "Map",
            MarkType::Text => "Text",
            MarkType::Automatic => "Automatic",
        }
    }
}

/// A named slot fields are assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shelf {
    Columns,
    Rows,
    Color,
    Size,
    Label,
    Detail,
    Filter,
}

impl Shelf {
    pub fn document_name(self) -> &'static str {
        match self {
            Shelf::Columns => "columns",
            Shelf::Rows => "rows",
            Shelf::Color => "color",
            Shelf::Size => "size",
            Shelf::Label => "label",
            Shelf::Detail => "detail",
            Shelf::Filter => "filter",
        }
    }
}

/// Aggregation applied to a measure on a shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregation {
    pub fn document_name(self) -> &'static str {
        match self {
            Aggregation::Sum => "Sum",
            Aggregation::Avg => "Avg",
            Aggregation::Count => "Count",
            Aggregation::Min => "Min",
            Aggregation::Max => "Max",
        }
    }
}

/// One field placed on a shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfEntry {
    pub field: String,
    /// None for dimensions and for calculations that already aggregate.
    pub aggregation: Option<Aggregation>,
}

/// A fully mapped worksheet: mark type plus ordered shelf assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationSpec {
    /// Worksheet name, unique within the workbook ("Sheet 1", ...).
    pub name: String,
    pub title: String,
    pub mark: MarkType,
    pub shelves: Vec<(Shelf, Vec<ShelfEntry>)>,
    pub priority: f64,
}

/// A KPI surfaced as a text tile; layout treats it like a small worksheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiTile {
    pub name: String,
    /// Name of the calculated field the tile displays.
    pub binding: String,
    pub number_format: String,
    pub target_value: Option<f64>,
}

/// Looks up a referenced name across plain fields and valid calculations.
struct Resolved<'a> {
    role: FieldRole,
    kind: Option<DataKind>,
    hint: Option<SemanticHint>,
    name: &'a str,
}

fn resolve<'a>(
    name: &'a str,
    fields: &'a [FieldDefinition],
    calcs: &'a [CalculatedField],
) -> Option<Resolved<'a>> {
    if let Some(field) = fields.iter().find(|f| f.name == name) {
        return Some(Resolved {
            role: field.role,
            kind: Some(field.data_kind),
            hint: field.hint,
            name: &field.name,
        });
    }
    calcs
        .iter()
        .find(|c| c.valid && c.name == name)
        .map(|calc| Resolved {
            role: calc.role,
            kind: None,
            hint: None,
            name: &calc.name,
        })
}

/// Maps every recommendation, skipping the unsatisfiable ones.
/// Worksheet names are assigned in output order.
pub fn map_visualizations(
    recommendations: &[VizRecommendation],
    fields: &[FieldDefinition],
    calcs: &[CalculatedField],
    report: &mut GenerationReport,
) -> Vec<VisualizationSpec> {
    let mut specs = Vec::new();

    for rec in recommendations {
        match map_one(rec, fields, calcs) {
            Ok(mut spec) => {
                spec.name = format!("Sheet {}", specs.len() + 1);
                specs.push(spec);
            }
            Err(reason) => {
                report.warn(
                    Stage::Visualizations,
                    format!("visualization '{}' skipped: {}", rec.title, reason),
                );
            }
        }
    }

    specs
}

fn map_one(
    rec: &VizRecommendation,
    fields: &[FieldDefinition],
    calcs: &[CalculatedField],
) -> Result<VisualizationSpec, String> {
    // Resolve all bindings up front; any unknown name skips the worksheet.
    let mut all_names: Vec<&str> = Vec::new();
    all_names.extend(rec.x_axis.iter().map(|s| s.as_str()));
    all_names.extend(rec.y_axis.iter().map(|s| s.as_str()));
    if let Some(color) = &rec.color {
        all_names.push(color);
    }
    if let Some(size) = &rec.size {
        all_names.push(size);
    }
    for name in &all_names {
        if resolve(name, fields, calcs).is_none() {
            return Err(format!("unknown field [{}]", name));
        }
    }

    let x: Vec<Resolved> = rec
        .x_axis
        .iter()
        .filter_map(|n| resolve(n, fields, calcs))
        .collect();
    let y: Vec<Resolved> = rec
        .y_axis
        .iter()
        .filter_map(|n| resolve(n, fields, calcs))
        .collect();

    let agg = rec.aggregation.unwrap_or(Aggregation::Sum);
    let mut shelves: Vec<(Shelf, Vec<ShelfEntry>)> = Vec::new();

    let mark = match rec.kind {
        VizKind::Bar => {
            let dims = dimensions(&x);
            let measures = measures(&y);
            if dims.is_empty() {
                return Err("requires a dimension on the x axis".to_string());
            }
            if measures.is_empty() {
                return Err("requires a measure on the y axis".to_string());
            }
            shelves.push((Shelf::Columns, plain_entries(&dims)));
            shelves.push((Shelf::Rows, measure_entries(&measures, agg)));
            MarkType::Bar
        }
        VizKind::Line | VizKind::Area => {
            let temporal: Vec<&Resolved> = x
                .iter()
                .filter(|r| r.kind.map(DataKind::is_temporal).unwrap_or(false))
                .collect();
            let measures = measures(&y);
            if temporal.is_empty() {
                return Err("requires a date column on the x axis".to_string());
            }
            if measures.is_empty() {
                return Err("requires a measure on the y axis".to_string());
            }
            shelves.push((
                Shelf::Columns,
                temporal
                    .iter()
                    .map(|r| ShelfEntry {
                        field: r.name.to_string(),
                        aggregation: None,
                    })
                    .collect(),
            ));
            shelves.push((Shelf::Rows, measure_entries(&measures, agg)));
            if rec.kind == VizKind::Line {
                MarkType::Line
            } else {
                MarkType::Area
            }
        }
        VizKind::Scatter => {
            let x_measures = measures(&x);
            let y_measures = measures(&y);
            if x_measures.is_empty() || y_measures.is_empty() {
                return Err("requires measures on both axes".to_string());
            }
            shelves.push((Shelf::Columns, measure_entries(&x_measures, agg)));
            shelves.push((Shelf::Rows, measure_entries(&y_measures, agg)));
            MarkType::Circle
        }
        VizKind::Pie => {
            let dims = first_dimension(&x, &y);
            let measures = first_measure(&x, &y);
            let dim = dims.ok_or_else(|| "requires a dimension".to_string())?;
            let measure = measures.ok_or_else(|| "requires a measure".to_string())?;
            shelves.push((Shelf::Color, vec![plain_entry(dim)]));
            shelves.push((Shelf::Size, vec![measure_entry(measure, agg)]));
            MarkType::Pie
        }
        VizKind::Histogram => {
            let measure =
                first_measure(&x, &y).ok_or_else(|| "requires a measure".to_string())?;
            shelves.push((Shelf::Columns, vec![plain_entry(measure)]));
            shelves.push((
                Shelf::Rows,
                vec![ShelfEntry {
                    field: measure.name.to_string(),
                    aggregation: Some(Aggregation::Count),
                }],
            ));
            MarkType::Bar
        }
        VizKind::Heatmap => {
            let dims: Vec<&Resolved> = x.iter().chain(y.iter()).filter(|r| is_dim(r)).collect();
            if dims.len() < 2 {
                return Err("requires two dimensions".to_string());
            }
            let measure =
                first_measure(&x, &y).ok_or_else(|| "requires a measure".to_string())?;
            shelves.push((Shelf::Columns, vec![plain_entry(dims[0])]));
            shelves.push((Shelf::Rows, vec![plain_entry(dims[1])]));
            shelves.push((Shelf::Color, vec![measure_entry(measure, agg)]));
            MarkType::Square
        }
        VizKind::Treemap => {
            let dim =
                first_dimension(&x, &y).ok_or_else(|| "requires a dimension".to_string())?;
            let measure =
                first_measure(&x, &y).ok_or_else(|| "requires a measure".to_string())?;
            shelves.push((Shelf::Label, vec![plain_entry(dim)]));
            shelves.push((Shelf::Size, vec![measure_entry(measure, agg)]));
            MarkType::Square
        }
        VizKind::Map => {
            let geo = x
                .iter()
                .chain(y.iter())
                .find(|r| r.hint == Some(SemanticHint::Geographic))
                .ok_or_else(|| "requires a geographic field".to_string())?;
            // The geographic dimension drives both generated coordinates.
            shelves.push((Shelf::Columns, vec![plain_entry(geo)]));
            shelves.push((Shelf::Rows, vec![plain_entry(geo)]));
            if let Some(measure) = first_measure(&x, &y) {
                shelves.push((Shelf::Color, vec![measure_entry(measure, agg)]));
            }
            MarkType::Map
        }
        VizKind::Table => {
            let dims: Vec<&Resolved> = x.iter().chain(y.iter()).filter(|r| is_dim(r)).collect();
            if dims.is_empty() {
                return Err("requires a dimension".to_string());
            }
            shelves.push((Shelf::Rows, dims.iter().map(|r| plain_entry(r)).collect()));
            let measures: Vec<&Resolved> =
                x.iter().chain(y.iter()).filter(|r| !is_dim(r)).collect();
            if !measures.is_empty() {
                shelves.push((
                    Shelf::Label,
                    measures.iter().map(|r| measure_entry(r, agg)).collect(),
                ));
            }
            MarkType::Text
        }
    };

    // Optional encodings shared by all kinds (resolution was checked above).
    if let Some(resolved) = rec.color.as_deref().and_then(|n| resolve(n, fields, calcs)) {
        if !shelves.iter().any(|(s, _)| *s == Shelf::Color) {
            let entry = if is_dim(&resolved) {
                plain_entry(&resolved)
            } else {
                measure_entry(&resolved, agg)
            };
            shelves.push((Shelf::Color, vec![entry]));
        }
    }
    if let Some(resolved) = rec.size.as_deref().and_then(|n| resolve(n, fields, calcs)) {
        if !shelves.iter().any(|(s, _)| *s == Shelf::Size) {
            let entry = if is_dim(&resolved) {
                plain_entry(&resolved)
            } else {
                measure_entry(&resolved, agg)
            };
            shelves.push((Shelf::Size, vec![entry]));
        }
    }

    Ok(VisualizationSpec {
        name: String::new(), // assigned by map_visualizations
        title: rec.title.clone(),
        mark,
        shelves,
        priority: rec.priority,
    })
}

fn is_dim(resolved: &Resolved) -> bool {
    resolved.role == FieldRole::Dimension
}

fn dimensions<'a, 'b>(resolved: &'a [Resolved<'b>]) -> Vec<&'a Resolved<'b>> {
    resolved.iter().filter(|r| is_dim(r)).collect()
}

fn measures<'a, 'b>(resolved: &'a [Resolved<'b>]) -> Vec<&'a Resolved<'b>> {
    resolved.iter().filter(|r| !is_dim(r)).collect()
}

fn first_dimension<'a, 'b>(
    x: &'a [Resolved<'b>],
    y: &'a [Resolved<'b>],
) -> Option<&'a Resolved<'b>> {
    x.iter().chain(y.iter()).find(|r| is_dim(r))
}

fn first_measure<'a, 'b>(
    x: &'a [Resolved<'b>],
    y: &'a [Resolved<'b>],
) -> Option<&'a Resolved<'b>> {
    x.iter().chain(y.iter()).find(|r| !is_dim(r))
}

fn plain_entry(resolved: &Resolved) -> ShelfEntry {
    ShelfEntry {
        field: resolved.name.to_string(),
        aggregation: None,
    }
}

fn plain_entries(resolved: &[&Resolved]) -> Vec<ShelfEntry> {
    resolved.iter().map(|r| plain_entry(r)).collect()
}

/// Measures get the recommendation's aggregation; calculations that
/// already aggregate (anything that is not a plain field) are left alone.
fn measure_entry(resolved: &Resolved, agg: Aggregation) -> ShelfEntry {
    ShelfEntry {
        field: resolved.name.to_string(),
        aggregation: if resolved.kind.is_some() {
            Some(agg)
        } else {
            None
        },
    }
}

fn measure_entries(resolved: &[&Resolved], agg: Aggregation) -> Vec<ShelfEntry> {
    resolved.iter().map(|r| measure_entry(r, agg)).collect()
}
