//! FILENAME: engine/src/report.rs
//! PURPOSE: The generation report accumulated across every stage.
//! CONTEXT: Components never stop at the first issue; they append to this
//! report and keep going. Warnings mean an item was excluded or skipped
//! but generation continued; fatal errors mean no artifact is produced.
//! The caller always receives the complete ordered set for one call.

use serde::{Deserialize, Serialize};

/// The stage that raised a report entry, for grouping in UIs and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Schema,
    Calculations,
    Visualizations,
    Layout,
    Serialization,
    Packaging,
    Validation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Schema => "schema",
            Stage::Calculations => "calculations",
            Stage::Visualizations => "visualizations",
            Stage::Layout => "layout",
            Stage::Serialization => "serialization",
            Stage::Packaging => "packaging",
            Stage::Validation => "validation",
        };
        write!(f, "{}", name)
    }
}

/// One warning or error, in the order it was raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub stage: Stage,
    pub message: String,
}

/// Summary counts over the whole generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub datasources: usize,
    pub fields: usize,
    pub calculated_fields: usize,
    pub excluded_calculations: usize,
    pub worksheets: usize,
    pub skipped_visualizations: usize,
    pub kpi_tiles: usize,
    pub dashboards: usize,
}

/// Accumulates warnings, fatal errors and summary counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub warnings: Vec<ReportEntry>,
    pub errors: Vec<ReportEntry>,
    pub summary: Summary,
}

impl GenerationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a non-fatal issue; generation continues.
    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %stage, "{}", message);
        self.warnings.push(ReportEntry { stage, message });
    }

    /// Records a fatal error; the call will produce no artifact.
    pub fn fatal(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(stage = %stage, "{}", message);
        self.errors.push(ReportEntry { stage, message });
    }

    pub fn has_fatal(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
