//! FILENAME: twbx-format/src/package.rs
//! PURPOSE: Assembles the packaged workbook archive.
//! CONTEXT: A package is a ZIP with exactly one document entry at the
//! root, one Data/<id>.csv per datasource with embedded rows, and a
//! manifest listing both. Entry paths always use forward slashes. The
//! caller hands in a seekable sink (a temp file: artifacts only become
//! visible after validation passes) and an optional cancellation flag
//! checked between blocking steps.

use crate::data::dataset_csv;
use crate::error::FormatError;
use engine::{TabularDataset, Workbook};
use persistence::{assign_ids, slugify};
use serde::{Deserialize, Serialize};
use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive entry name of the manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Cooperative cancellation shared with the caller. Packaging checks it
/// between blocking steps and bails out with `FormatError::Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn check_cancelled(cancel: Option<&CancelFlag>) -> Result<(), FormatError> {
    if cancel.map(CancelFlag::is_cancelled).unwrap_or(false) {
        return Err(FormatError::Cancelled);
    }
    Ok(())
}

/// The archive's table of contents, stored as JSON at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// The single document entry at the archive root.
    pub document: String,
    /// One embedded data entry per datasource with rows.
    pub data: Vec<String>,
}

impl Manifest {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// The document entry name for a workbook.
pub fn document_entry_name(workbook: &Workbook) -> String {
    format!("{}.twb", slugify(&workbook.name))
}

/// Writes the complete archive into `sink`.
///
/// `datasets` must align with `workbook.datasources` (same order); only
/// datasources flagged `has_rows` get a data entry. Returns the manifest
/// that was written.
pub fn package_twbx<W: Write + Seek>(
    workbook: &Workbook,
    datasets: &[&TabularDataset],
    document_xml: &[u8],
    sink: W,
    cancel: Option<&CancelFlag>,
) -> Result<Manifest, FormatError> {
    let options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(sink);

    check_cancelled(cancel)?;

    let document = document_entry_name(workbook);
    zip.start_file(document.as_str(), options)?;
    zip.write_all(document_xml)?;

    // Same id sequence as the document serializer, so connection
    // filenames and archive entries agree.
    let ids = assign_ids(workbook.datasources.iter().map(|d| d.name.as_str()));
    let mut data_entries = Vec::new();

    for ((datasource, id), dataset) in workbook
        .datasources
        .iter()
        .zip(ids.iter())
        .zip(datasets.iter())
    {
        if !datasource.has_rows {
            continue;
        }
        check_cancelled(cancel)?;

        let entry = format!("Data/{}.csv", id);
        let csv = dataset_csv(&datasource.fields, dataset)?;
        zip.start_file(entry.as_str(), options)?;
        zip.write_all(&csv)?;
        data_entries.push(entry);
    }

    check_cancelled(cancel)?;

    let manifest = Manifest {
        document,
        data: data_entries,
    };
    zip.start_file(MANIFEST_ENTRY, options)?;
    zip.write_all(manifest.to_json().as_bytes())?;

    zip.finish()?;

    tracing::debug!(
        document = %manifest.document,
        data_entries = manifest.data.len(),
        "archive packaged"
    );
    Ok(manifest)
}
