//! FILENAME: persistence/src/twb_reader.rs
//! PURPOSE: Parses a TWB document back for structural validation.
//! CONTEXT: The final integrity pass re-reads what the writer produced:
//! the document must parse, every shelf reference must resolve against a
//! declared datasource column, the embedded calculation graph must be
//! acyclic, and dashboard zones must point at real worksheets. Parse
//! failures are hard errors; referential problems come back as a message
//! list so the caller can report all of them at once.

use crate::error::PersistenceError;
use formula::{extract_dependencies, DependencyGraph};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};

/// A datasource as declared in the document.
#[derive(Debug, Clone)]
pub struct DeclaredDatasource {
    /// Internal name, e.g. "federated.sales".
    pub id: String,
    pub caption: String,
    /// Declared column names (plain fields and calculations).
    pub columns: Vec<String>,
    /// (name, formula) pairs for calculation records.
    pub calculations: Vec<(String, String)>,
}

/// A worksheet and the shelf references it uses.
#[derive(Debug, Clone)]
pub struct DeclaredWorksheet {
    pub name: String,
    /// Raw column references: "[federated.sales].[Region]".
    pub column_refs: Vec<String>,
}

/// A dashboard and the worksheets its zones point at.
#[derive(Debug, Clone)]
pub struct DeclaredDashboard {
    pub name: String,
    pub worksheet_refs: Vec<String>,
}

/// Everything the validator needs from one parsed document.
#[derive(Debug, Clone, Default)]
pub struct DocumentSummary {
    pub datasources: Vec<DeclaredDatasource>,
    pub worksheets: Vec<DeclaredWorksheet>,
    pub dashboards: Vec<DeclaredDashboard>,
}

/// What the parser is waiting to read text for.
enum TextTarget {
    RemoteName,
    ColumnRef,
}

/// Parses the document structure. Any XML-level failure is fatal.
pub fn parse_document(xml: &[u8]) -> Result<DocumentSummary, PersistenceError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut summary = DocumentSummary::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_target: Option<TextTarget> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(PersistenceError::Xml(e)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                handle_element(&e, &path, &mut summary, &mut text_target)?;
                path.push(element_name(&e)?);
            }
            Ok(Event::Empty(e)) => {
                handle_element(&e, &path, &mut summary, &mut text_target)?;
                // Empty elements never carry text.
                text_target = None;
            }
            Ok(Event::End(_)) => {
                path.pop();
                text_target = None;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(PersistenceError::Xml)?
                    .into_owned();
                match text_target.take() {
                    Some(TextTarget::RemoteName) => {
                        if let Some(ds) = summary.datasources.last_mut() {
                            ds.columns.push(text);
                        }
                    }
                    Some(TextTarget::ColumnRef) => {
                        if let Some(ws) = summary.worksheets.last_mut() {
                            ws.column_refs.push(text);
                        }
                    }
                    None => {}
                }
            }
            Ok(_) => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(PersistenceError::MalformedDocument(format!(
            "unclosed element <{}>",
            path.last().map(String::as_str).unwrap_or("?")
        )));
    }

    Ok(summary)
}

fn element_name(e: &BytesStart) -> Result<String, PersistenceError> {
    String::from_utf8(e.name().as_ref().to_vec())
        .map_err(|_| PersistenceError::MalformedDocument("non-utf8 element name".to_string()))
}

fn attr_value(e: &BytesStart, key: &str) -> Result<Option<String>, PersistenceError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            PersistenceError::MalformedDocument(format!("bad attribute: {}", err))
        })?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(PersistenceError::Xml)?
                .into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn handle_element(
    e: &BytesStart,
    path: &[String],
    summary: &mut DocumentSummary,
    text_target: &mut Option<TextTarget>,
) -> Result<(), PersistenceError> {
    let name = element_name(e)?;
    let depth_2 = |a: &str| path.len() == 2 && path[0] == "workbook" && path[1] == a;

    match name.as_str() {
        // Top-level datasource declarations only; worksheet views carry
        // their own shallow datasource references.
        "datasource" if depth_2("datasources") => {
            summary.datasources.push(DeclaredDatasource {
                id: attr_value(e, "name")?.unwrap_or_default(),
                caption: attr_value(e, "caption")?.unwrap_or_default(),
                columns: Vec::new(),
                calculations: Vec::new(),
            });
        }
        "remote-name" if path.iter().any(|p| p == "metadata-record") => {
            *text_target = Some(TextTarget::RemoteName);
        }
        "calculation" if path.iter().any(|p| p == "metadata-record") => {
            if let Some(formula) = attr_value(e, "formula")? {
                if let Some(ds) = summary.datasources.last_mut() {
                    let name = ds.columns.last().cloned().unwrap_or_default();
                    ds.calculations.push((name, formula));
                }
            }
        }
        "worksheet" if depth_2("worksheets") => {
            summary.worksheets.push(DeclaredWorksheet {
                name: attr_value(e, "name")?.unwrap_or_default(),
                column_refs: Vec::new(),
            });
        }
        "column" if path.iter().any(|p| p == "encodings") => {
            *text_target = Some(TextTarget::ColumnRef);
        }
        "dashboard" if depth_2("dashboards") => {
            summary.dashboards.push(DeclaredDashboard {
                name: attr_value(e, "name")?.unwrap_or_default(),
                worksheet_refs: Vec::new(),
            });
        }
        "worksheet" if path.iter().any(|p| p == "zones") => {
            if let Some(db) = summary.dashboards.last_mut() {
                if let Some(ws_name) = attr_value(e, "name")? {
                    db.worksheet_refs.push(ws_name);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Splits "[federated.sales].[Region]" into (datasource id, column name).
fn split_column_ref(reference: &str) -> Option<(&str, &str)> {
    let inner = reference.strip_prefix('[')?.strip_suffix(']')?;
    let (ds, field) = inner.split_once("].[")?;
    Some((ds, field))
}

/// Full structural + referential check over a serialized document.
///
/// Returns the (possibly empty) problem list; `Err` means the document
/// did not even parse.
pub fn check_workbook_xml(xml: &[u8]) -> Result<Vec<String>, PersistenceError> {
    let summary = parse_document(xml)?;
    let mut problems = Vec::new();

    let columns_by_ds: HashMap<&str, HashSet<&str>> = summary
        .datasources
        .iter()
        .map(|ds| {
            (
                ds.id.as_str(),
                ds.columns.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    // (b) every shelf reference resolves.
    for worksheet in &summary.worksheets {
        for reference in &worksheet.column_refs {
            match split_column_ref(reference) {
                Some((ds_id, column)) => match columns_by_ds.get(ds_id) {
                    Some(columns) => {
                        if !columns.contains(column) {
                            problems.push(format!(
                                "worksheet '{}' references undeclared column [{}] in datasource '{}'",
                                worksheet.name, column, ds_id
                            ));
                        }
                    }
                    None => problems.push(format!(
                        "worksheet '{}' references unknown datasource '{}'",
                        worksheet.name, ds_id
                    )),
                },
                None => problems.push(format!(
                    "worksheet '{}' has malformed column reference '{}'",
                    worksheet.name, reference
                )),
            }
        }
    }

    // (c) the embedded calculation graph is acyclic.
    for ds in &summary.datasources {
        let calc_names: HashSet<&str> =
            ds.calculations.iter().map(|(n, _)| n.as_str()).collect();
        let mut graph = DependencyGraph::new();
        for (name, formula) in &ds.calculations {
            let precedents: HashSet<String> = extract_dependencies(formula)
                .into_iter()
                .filter(|dep| calc_names.contains(dep.as_str()))
                .collect();
            graph.set_dependencies(name, precedents);
        }
        let mut members: Vec<String> = graph.cycle_members().into_iter().collect();
        members.sort();
        for member in members {
            problems.push(format!(
                "datasource '{}' embeds cyclic calculation '{}'",
                ds.caption, member
            ));
        }
    }

    // Dashboard zones must point at real worksheets.
    let worksheet_names: HashSet<&str> = summary
        .worksheets
        .iter()
        .map(|w| w.name.as_str())
        .collect();
    for dashboard in &summary.dashboards {
        for ws_ref in &dashboard.worksheet_refs {
            if !worksheet_names.contains(ws_ref.as_str()) {
                problems.push(format!(
                    "dashboard '{}' references unknown worksheet '{}'",
                    dashboard.name, ws_ref
                ));
            }
        }
    }

    Ok(problems)
}
