//! FILENAME: twbx-format/src/lib.rs
//! Packaged Workbook Format
//!
//! Turns an analysis result into a downloadable workbook artifact: either
//! a bare TWB document or a TWBX archive with embedded data, plus the
//! full generation report. This crate owns packaging, archive
//! verification, atomic output and the top-level `generate_workbook`
//! entry point; the model and the document serializer live in the engine
//! and persistence crates.

mod archive_check;
mod data;
mod error;
mod generate;
mod package;

pub use archive_check::{verify_archive, VerifiedArchive};
pub use data::dataset_csv;
pub use error::FormatError;
pub use generate::{generate_workbook, Artifact, GenerateOptions, OutputFormat};
pub use package::{document_entry_name, package_twbx, CancelFlag, Manifest, MANIFEST_ENTRY};

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{
        AnalysisInput, CalculationSuggestion, DashboardStyle, DataValue, EngineConfig,
        KpiDefinition, RawColumn, RawSchema, TabularDataset, VizKind, VizRecommendation,
    };
    use persistence::{check_workbook_xml, parse_document};
    use std::io::Read;

    fn column(name: &str, native: &str) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            native_type: native.to_string(),
            distinct_values: None,
            null_count: 0,
            force_dimension: false,
        }
    }

    fn sales_dataset() -> TabularDataset {
        TabularDataset {
            schema: RawSchema {
                name: "sales".to_string(),
                row_count: 4,
                columns: vec![
                    column("Region", "object"),
                    column("Sales", "float64"),
                    column("Profit", "float64"),
                ],
            },
            rows: vec![
                vec![
                    DataValue::Text("North".to_string()),
                    DataValue::Real(100.0),
                    DataValue::Real(20.0),
                ],
                vec![
                    DataValue::Text("South".to_string()),
                    DataValue::Real(80.0),
                    DataValue::Real(12.0),
                ],
                vec![
                    DataValue::Text("East".to_string()),
                    DataValue::Real(95.0),
                    DataValue::Real(31.0),
                ],
                vec![
                    DataValue::Text("West".to_string()),
                    DataValue::Real(60.0),
                    DataValue::Real(8.0),
                ],
            ],
        }
    }

    fn targets_dataset() -> TabularDataset {
        TabularDataset {
            schema: RawSchema {
                name: "targets".to_string(),
                row_count: 2,
                columns: vec![column("Region", "object"), column("Target", "float64")],
            },
            rows: vec![
                vec![DataValue::Text("North".to_string()), DataValue::Real(120.0)],
                vec![DataValue::Text("South".to_string()), DataValue::Real(90.0)],
            ],
        }
    }

    fn bar_recommendation() -> VizRecommendation {
        VizRecommendation {
            title: "Sales by Region".to_string(),
            kind: VizKind::Bar,
            x_axis: vec!["Region".to_string()],
            y_axis: vec!["Sales".to_string()],
            color: None,
            size: None,
            aggregation: None,
            priority: 1.0,
        }
    }

    fn base_input() -> AnalysisInput {
        AnalysisInput {
            datasets: vec![sales_dataset()],
            kpis: vec![KpiDefinition {
                name: "Total Revenue".to_string(),
                description: None,
                calculation: "SUM([Sales])".to_string(),
                number_format: "$#,##0".to_string(),
                target_value: Some(1000.0),
            }],
            calculated_fields: vec![CalculationSuggestion {
                name: "Margin".to_string(),
                formula: "SUM([Profit]) / SUM([Sales])".to_string(),
            }],
            visualizations: vec![bar_recommendation()],
            style: DashboardStyle::Executive,
            workbook_name: None,
        }
    }

    fn archive_entries(path: &std::path::Path) -> Vec<String> {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn archive_document(path: &std::path::Path) -> Vec<u8> {
        let file = std::fs::File::open(path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let name = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .find(|n| n.ends_with(".twb"))
            .unwrap();
        let mut bytes = Vec::new();
        archive.by_name(&name).unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_twbx_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (artifact, report) = generate_workbook(
            &base_input(),
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        let artifact = artifact.expect("artifact");
        assert_eq!(artifact.format, OutputFormat::Twbx);
        assert!(artifact.path.exists());
        assert!(!report.has_fatal());

        let entries = archive_entries(&artifact.path);
        assert!(entries.iter().any(|e| e.ends_with(".twb")));
        assert!(entries.iter().any(|e| e == "Data/sales.csv"));
        assert!(entries.iter().any(|e| e == MANIFEST_ENTRY));

        // Chart worksheet plus the KPI tile worksheet.
        assert_eq!(report.summary.worksheets, 2);
        assert_eq!(report.summary.kpi_tiles, 1);
        assert_eq!(report.summary.calculated_fields, 2);
    }

    #[test]
    fn test_two_datasources_archive_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = base_input();
        input.datasets.push(targets_dataset());

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        let artifact = artifact.expect("artifact");
        assert!(!report.has_fatal());

        let entries = archive_entries(&artifact.path);
        let documents: Vec<&String> = entries
            .iter()
            .filter(|e| !e.contains('/') && e.ends_with(".twb"))
            .collect();
        let data: Vec<&String> = entries.iter().filter(|e| e.starts_with("Data/")).collect();
        assert_eq!(documents.len(), 1);
        assert_eq!(data.len(), 2);

        let verified = verify_archive(&artifact.path).unwrap();
        assert!(verified.problems.is_empty(), "{:?}", verified.problems);
    }

    #[test]
    fn test_below_minimum_rows_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = base_input();
        input.datasets[0].schema.row_count = 1;
        input.datasets[0].rows.truncate(1);

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        assert!(artifact.is_none());
        assert!(report.has_fatal());
        // No partial artifact on disk.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_circular_calculations_warn_but_generate() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = base_input();
        input.calculated_fields.push(CalculationSuggestion {
            name: "CalcA".to_string(),
            formula: "[CalcB] + 1".to_string(),
        });
        input.calculated_fields.push(CalculationSuggestion {
            name: "CalcB".to_string(),
            formula: "[CalcA] + 1".to_string(),
        });

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        let artifact = artifact.expect("artifact");
        assert!(!report.has_fatal());
        assert!(report.warning_count() >= 2);
        assert_eq!(report.summary.excluded_calculations, 2);

        // The cyclic pair never reaches the document.
        let summary = parse_document(&archive_document(&artifact.path)).unwrap();
        let calc_names: Vec<&str> = summary.datasources[0]
            .calculations
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert!(!calc_names.contains(&"CalcA"));
        assert!(!calc_names.contains(&"CalcB"));
        assert!(calc_names.contains(&"Margin"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let config = EngineConfig::default();

        let (a, _) =
            generate_workbook(&base_input(), &config, &GenerateOptions::new(dir_a.path()));
        let (b, _) =
            generate_workbook(&base_input(), &config, &GenerateOptions::new(dir_b.path()));

        let doc_a = archive_document(&a.unwrap().path);
        let doc_b = archive_document(&b.unwrap().path);
        assert_eq!(doc_a, doc_b);
    }

    #[test]
    fn test_twb_declares_external_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = GenerateOptions::new(dir.path());
        options.format = OutputFormat::Twb;

        let (artifact, report) =
            generate_workbook(&base_input(), &EngineConfig::default(), &options);

        let artifact = artifact.expect("artifact");
        assert!(!report.has_fatal());
        assert!(artifact.path.extension().unwrap() == "twb");

        let xml = std::fs::read(&artifact.path).unwrap();
        assert!(check_workbook_xml(&xml).unwrap().is_empty());
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("class=\"textscan\""));
        // External form: no package directory prefix on the connection.
        assert!(text.contains("directory=\"\""));
    }

    #[test]
    fn test_cancellation_produces_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut options = GenerateOptions::new(dir.path());
        options.cancel = Some(cancel);

        let (artifact, report) =
            generate_workbook(&base_input(), &EngineConfig::default(), &options);

        assert!(artifact.is_none());
        assert!(report
            .errors
            .iter()
            .any(|e| e.message.contains("cancelled")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_kpi_formula_skips_tile() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = base_input();
        input.kpis.push(KpiDefinition {
            name: "Bad KPI".to_string(),
            description: None,
            calculation: "".to_string(),
            number_format: "#,##0".to_string(),
            target_value: None,
        });

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        assert!(artifact.is_some());
        assert!(!report.has_fatal());
        assert_eq!(report.summary.kpi_tiles, 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.message.contains("Bad KPI")));
    }

    #[test]
    fn test_no_recommendations_still_produces_a_worksheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = base_input();
        input.visualizations.clear();
        input.kpis.clear();
        input.calculated_fields.clear();

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        assert!(artifact.is_some());
        assert!(!report.has_fatal());
        assert!(report.summary.worksheets >= 1);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = AnalysisInput {
            datasets: Vec::new(),
            kpis: Vec::new(),
            calculated_fields: Vec::new(),
            visualizations: Vec::new(),
            style: DashboardStyle::Executive,
            workbook_name: None,
        };

        let (artifact, report) = generate_workbook(
            &input,
            &EngineConfig::default(),
            &GenerateOptions::new(dir.path()),
        );

        assert!(artifact.is_none());
        assert!(report.has_fatal());
    }

    #[test]
    fn test_skip_data_omits_data_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = GenerateOptions::new(dir.path());
        options.skip_data = true;

        let (artifact, report) =
            generate_workbook(&base_input(), &EngineConfig::default(), &options);

        let artifact = artifact.expect("artifact");
        assert!(!report.has_fatal());
        let entries = archive_entries(&artifact.path);
        assert!(!entries.iter().any(|e| e.starts_with("Data/")));

        let verified = verify_archive(&artifact.path).unwrap();
        assert!(verified.problems.is_empty());
        assert!(verified.data_entries.is_empty());
    }
}
