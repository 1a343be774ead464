//! FILENAME: twbx-format/src/archive_check.rs
//! PURPOSE: Verifies a packaged archive against its manifest.
//! CONTEXT: Last leg of the integrity pass: the archive must open, carry
//! exactly one top-level document entry, and its entry list must match
//! the manifest exactly. Returns the document bytes so the caller can
//! re-run the document check on what was actually packaged.

use crate::error::FormatError;
use crate::package::{Manifest, MANIFEST_ENTRY};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// The opened archive plus every integrity problem found. An empty
/// problem list means the archive passed.
#[derive(Debug)]
pub struct VerifiedArchive {
    pub document_entry: String,
    pub document_xml: Vec<u8>,
    pub data_entries: Vec<String>,
    pub problems: Vec<String>,
}

/// Opens and verifies the archive at `path`.
///
/// `Err` means the archive could not be opened or read at all; integrity
/// findings are collected in `problems` so the caller reports them
/// together.
pub fn verify_archive(path: &Path) -> Result<VerifiedArchive, FormatError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut problems = Vec::new();
    let mut entries: Vec<String> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains('\\') {
            problems.push(format!("entry '{}' uses backslash separators", name));
        }
        entries.push(name);
    }

    // The manifest itself.
    let manifest = match entries.iter().find(|e| e.as_str() == MANIFEST_ENTRY) {
        Some(_) => {
            let mut text = String::new();
            archive.by_name(MANIFEST_ENTRY)?.read_to_string(&mut text)?;
            match Manifest::from_json(&text) {
                Some(manifest) => Some(manifest),
                None => {
                    problems.push("manifest does not parse".to_string());
                    None
                }
            }
        }
        None => {
            problems.push("archive has no manifest".to_string());
            None
        }
    };

    // Exactly one top-level document entry.
    let top_level_documents: Vec<&String> = entries
        .iter()
        .filter(|e| !e.contains('/') && e.ends_with(".twb"))
        .collect();
    if top_level_documents.len() != 1 {
        problems.push(format!(
            "archive has {} top-level document entries, expected exactly 1",
            top_level_documents.len()
        ));
    }

    let mut document_entry = String::new();
    let mut data_entries = Vec::new();

    if let Some(manifest) = &manifest {
        // The entry list (minus the manifest) must match the manifest.
        let listed: HashSet<&str> = std::iter::once(manifest.document.as_str())
            .chain(manifest.data.iter().map(String::as_str))
            .collect();
        let present: HashSet<&str> = entries
            .iter()
            .map(String::as_str)
            .filter(|e| *e != MANIFEST_ENTRY)
            .collect();

        for missing in listed.difference(&present) {
            problems.push(format!("manifest lists missing entry '{}'", missing));
        }
        for extra in present.difference(&listed) {
            problems.push(format!("entry '{}' is not in the manifest", extra));
        }

        document_entry = manifest.document.clone();
        data_entries = manifest.data.clone();
    }

    // Pull the document bytes for the parse-back check.
    let mut document_xml = Vec::new();
    if !document_entry.is_empty() && entries.iter().any(|e| *e == document_entry) {
        archive
            .by_name(&document_entry)?
            .read_to_end(&mut document_xml)?;
    } else if let Some(first) = top_level_documents.first() {
        let name = (*first).clone();
        archive.by_name(&name)?.read_to_end(&mut document_xml)?;
        document_entry = name;
    }

    Ok(VerifiedArchive {
        document_entry,
        document_xml,
        data_entries,
        problems,
    })
}
