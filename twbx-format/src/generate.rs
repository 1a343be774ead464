//! FILENAME: twbx-format/src/generate.rs
//! PURPOSE: The single entry point: analysis input in, artifact + report out.
//! CONTEXT: One pure, synchronous pass: normalize schemas, build
//! calculated fields, map visualizations, lay out dashboards, assemble the
//! workbook, serialize, package and validate. Warnings exclude individual
//! items; any fatal error means no artifact is exposed. Output is written
//! to a temp file and only renamed into place after every check passes,
//! so callers never observe a half-written artifact.

use crate::archive_check::verify_archive;
use crate::error::FormatError;
use crate::package::{document_entry_name, package_twbx, CancelFlag};
use engine::{
    build_calculated_fields, kpi_worksheet, lay_out_dashboards, map_visualizations,
    normalize_schema, AnalysisInput, Aggregation, ConnectionMode, Datasource, EngineConfig,
    FieldDefinition, GenerationReport, KpiTile, MarkType, Shelf, ShelfEntry, Stage,
    TabularDataset, VisualizationSpec, Workbook, Worksheet,
};
use persistence::{check_workbook_xml, slugify, write_workbook_xml};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Artifact form: a bare document or a packaged archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Twb,
    #[default]
    Twbx,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Twb => "twb",
            OutputFormat::Twbx => "twbx",
        }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub format: OutputFormat,
    pub output_dir: PathBuf,
    /// Skip data embedding even for packaged output.
    pub skip_data: bool,
    /// Cooperative cancellation for the blocking steps.
    pub cancel: Option<CancelFlag>,
}

impl GenerateOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        GenerateOptions {
            format: OutputFormat::default(),
            output_dir: output_dir.into(),
            skip_data: false,
            cancel: None,
        }
    }
}

/// The finished, validated, atomically exposed output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: OutputFormat,
}

/// Generates one workbook. Always returns the complete report; the
/// artifact is present only when no fatal error occurred.
pub fn generate_workbook(
    input: &AnalysisInput,
    config: &EngineConfig,
    options: &GenerateOptions,
) -> (Option<Artifact>, GenerationReport) {
    let mut report = GenerationReport::new();
    let artifact = run(input, config, options, &mut report);
    if artifact.is_some() {
        tracing::info!(
            warnings = report.warning_count(),
            "workbook generated"
        );
    } else {
        tracing::info!(errors = report.error_count(), "generation failed");
    }
    (artifact, report)
}

fn run(
    input: &AnalysisInput,
    config: &EngineConfig,
    options: &GenerateOptions,
    report: &mut GenerationReport,
) -> Option<Artifact> {
    if input.datasets.is_empty() {
        report.fatal(Stage::Schema, "no datasets provided");
        return None;
    }

    // Duplicate dataset names would collide in the archive; first wins.
    let mut datasets: Vec<&TabularDataset> = Vec::new();
    for dataset in &input.datasets {
        if datasets
            .iter()
            .any(|d| d.schema.name == dataset.schema.name)
        {
            report.warn(
                Stage::Schema,
                format!("duplicate dataset '{}' skipped", dataset.schema.name),
            );
        } else {
            datasets.push(dataset);
        }
    }

    let mut normalized: Vec<(Vec<FieldDefinition>, &TabularDataset)> = Vec::new();
    for dataset in &datasets {
        if let Some(fields) = normalize_schema(&dataset.schema, config, report) {
            normalized.push((fields, *dataset));
        }
    }
    if report.has_fatal() {
        return None;
    }

    // Calculated fields and bindings resolve against the primary dataset.
    let primary_fields = &normalized[0].0;
    let calcs = build_calculated_fields(
        &input.calculated_fields,
        &input.kpis,
        primary_fields,
        config,
        report,
    );

    let mut tiles: Vec<KpiTile> = Vec::new();
    for kpi in &input.kpis {
        if calcs.iter().any(|c| c.valid && c.name == kpi.name) {
            tiles.push(KpiTile {
                name: kpi.name.clone(),
                binding: kpi.name.clone(),
                number_format: kpi.number_format.clone(),
                target_value: kpi.target_value,
            });
        } else {
            report.warn(
                Stage::Visualizations,
                format!("KPI tile '{}' skipped: calculation excluded", kpi.name),
            );
        }
    }

    let mut specs = map_visualizations(&input.visualizations, primary_fields, &calcs, report);
    let mapped = specs.len();
    if specs.is_empty() {
        if let Some(fallback) = fallback_spec(primary_fields) {
            tracing::debug!(title = %fallback.title, "no mapped visualization, using fallback");
            specs.push(fallback);
        }
    }

    // Tile worksheet names must not collide with chart worksheet names.
    let chart_names: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    for tile in &mut tiles {
        if chart_names.contains(tile.name.as_str()) {
            tile.name = format!("{} Tile", tile.name);
        }
    }

    let pages = lay_out_dashboards(&tiles, &specs, input.style, config);

    let format = options.format;
    let embed = format == OutputFormat::Twbx && !options.skip_data;

    let primary_name = normalized[0].1.schema.name.clone();
    let datasources: Vec<Datasource> = normalized
        .iter()
        .enumerate()
        .map(|(i, (fields, dataset))| Datasource {
            name: dataset.schema.name.clone(),
            fields: fields.clone(),
            calculated_fields: if i == 0 { calcs.clone() } else { Vec::new() },
            row_count: dataset.schema.row_count,
            has_rows: embed && !dataset.rows.is_empty(),
        })
        .collect();

    let mut worksheets: Vec<Worksheet> = specs
        .iter()
        .map(|spec| Worksheet {
            spec: spec.clone(),
            datasource: primary_name.clone(),
        })
        .collect();
    for tile in &tiles {
        worksheets.push(kpi_worksheet(tile, &primary_name));
    }

    let workbook = Workbook {
        name: input.workbook_name(),
        datasources,
        worksheets,
        dashboards: pages,
        kpi_tiles: tiles,
    };

    report.summary.datasources = workbook.datasources.len();
    report.summary.fields = workbook.datasources.iter().map(|d| d.fields.len()).sum();
    report.summary.calculated_fields = calcs.iter().filter(|c| c.valid).count();
    report.summary.excluded_calculations = calcs.iter().filter(|c| !c.valid).count();
    report.summary.worksheets = workbook.worksheets.len();
    report.summary.skipped_visualizations = input.visualizations.len().saturating_sub(mapped);
    report.summary.kpi_tiles = workbook.kpi_tiles.len();
    report.summary.dashboards = workbook.dashboards.len();

    // Serialize and check the document before anything touches disk.
    let mode = if embed {
        ConnectionMode::Embedded
    } else {
        ConnectionMode::External
    };
    let xml = match write_workbook_xml(&workbook, config, mode) {
        Ok(xml) => xml,
        Err(e) => {
            report.fatal(Stage::Serialization, e.to_string());
            return None;
        }
    };
    if !document_passes(&xml, report) {
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&options.output_dir) {
        report.fatal(
            Stage::Packaging,
            format!("cannot create output directory: {}", e),
        );
        return None;
    }
    if options
        .cancel
        .as_ref()
        .map(CancelFlag::is_cancelled)
        .unwrap_or(false)
    {
        report.fatal(Stage::Packaging, "generation cancelled");
        return None;
    }

    let stem = slugify(&workbook.name);
    let final_path = options
        .output_dir
        .join(format!("{}.{}", stem, format.extension()));

    let mut temp = match NamedTempFile::new_in(&options.output_dir) {
        Ok(temp) => temp,
        Err(e) => {
            report.fatal(Stage::Packaging, format!("cannot create temp file: {}", e));
            return None;
        }
    };

    match format {
        OutputFormat::Twb => {
            if let Err(e) = temp.write_all(&xml) {
                report.fatal(Stage::Packaging, format!("document write failed: {}", e));
                return None;
            }
        }
        OutputFormat::Twbx => {
            let aligned: Vec<&TabularDataset> =
                normalized.iter().map(|(_, dataset)| *dataset).collect();
            let packaged = package_twbx(
                &workbook,
                &aligned,
                &xml,
                temp.as_file_mut(),
                options.cancel.as_ref(),
            );
            match packaged {
                Ok(_) => {}
                Err(FormatError::Cancelled) => {
                    report.fatal(Stage::Packaging, "generation cancelled");
                    return None;
                }
                Err(e) => {
                    report.fatal(Stage::Packaging, format!("archive write failed: {}", e));
                    return None;
                }
            }

            // Validate the packaged artifact itself, not just the bytes we
            // intended to put in it.
            let verified = match verify_archive(temp.path()) {
                Ok(verified) => verified,
                Err(e) => {
                    report.fatal(Stage::Validation, format!("archive check failed: {}", e));
                    return None;
                }
            };
            if !verified.problems.is_empty() {
                for problem in verified.problems {
                    report.fatal(Stage::Validation, problem);
                }
                return None;
            }
            if verified.document_entry != document_entry_name(&workbook) {
                report.fatal(
                    Stage::Validation,
                    format!(
                        "archive document entry '{}' does not match '{}'",
                        verified.document_entry,
                        document_entry_name(&workbook)
                    ),
                );
                return None;
            }
            if !document_passes(&verified.document_xml, report) {
                return None;
            }
        }
    }

    match temp.persist(&final_path) {
        Ok(_) => Some(Artifact {
            path: final_path,
            format,
        }),
        Err(e) => {
            report.fatal(Stage::Packaging, format!("atomic rename failed: {}", e));
            None
        }
    }
}

/// Runs the document integrity check and turns findings into fatals.
fn document_passes(xml: &[u8], report: &mut GenerationReport) -> bool {
    match check_workbook_xml(xml) {
        Ok(problems) if problems.is_empty() => true,
        Ok(problems) => {
            for problem in problems {
                report.fatal(Stage::Validation, problem);
            }
            false
        }
        Err(e) => {
            report.fatal(Stage::Validation, format!("document does not parse: {}", e));
            false
        }
    }
}

/// With no usable recommendation, a dataset that still has a grouping
/// dimension and a measure gets a plain bar chart overview.
fn fallback_spec(fields: &[FieldDefinition]) -> Option<VisualizationSpec> {
    let dimension = fields
        .iter()
        .find(|f| f.is_dimension() && f.hint.is_none())
        .or_else(|| fields.iter().find(|f| f.is_dimension()))?;
    let measure = fields.iter().find(|f| f.is_measure())?;

    Some(VisualizationSpec {
        name: "Sheet 1".to_string(),
        title: format!("{} by {}", measure.name, dimension.name),
        mark: MarkType::Bar,
        shelves: vec![
            (
                Shelf::Columns,
                vec![ShelfEntry {
                    field: dimension.name.clone(),
                    aggregation: None,
                }],
            ),
            (
                Shelf::Rows,
                vec![ShelfEntry {
                    field: measure.name.clone(),
                    aggregation: Some(Aggregation::Sum),
                }],
            ),
        ],
        priority: 0.0,
    })
}
