//! FILENAME: persistence/src/twb_writer.rs
//! PURPOSE: Serializes the assembled workbook model into a TWB document.
//! CONTEXT: Pure transform: the same model and configuration always yield
//! the same bytes. The writer owns escaping (via quick-xml) and id
//! assignment (slug + collision suffix in first-seen order); nothing here
//! touches the filesystem. Targets the 2023.3 desktop workbook grammar:
//! workbook / datasources / worksheets / dashboards / windows.

use crate::error::PersistenceError;
use crate::ids::assign_ids;
use engine::{
    ConnectionMode, Datasource, EngineConfig, FieldRole, Workbook, Worksheet,
};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashMap;

/// Serializes the workbook. `mode` decides whether datasource connections
/// point into the package (`Embedded`) or at external files (`External`).
pub fn write_workbook_xml(
    workbook: &Workbook,
    config: &EngineConfig,
    mode: ConnectionMode,
) -> Result<Vec<u8>, PersistenceError> {
    let mut xml = XmlOut::new();

    xml.declaration()?;

    xml.start(
        "workbook",
        &[
            ("version", config.document_version.as_str()),
            ("build-version", config.build_version.as_str()),
            ("source-build", config.build_version.as_str()),
        ],
    )?;
    xml.empty("preferences", &[])?;
    let repo_path = format!("{}.twb", workbook.name);
    xml.empty(
        "repository-location",
        &[("id", "TWB Repository"), ("path", repo_path.as_str())],
    )?;

    // Ids are assigned in datasource order; the packager recomputes the
    // same sequence for data entry names.
    let ids = assign_ids(workbook.datasources.iter().map(|d| d.name.as_str()));
    let id_by_name: HashMap<&str, &str> = workbook
        .datasources
        .iter()
        .zip(ids.iter())
        .map(|(d, id)| (d.name.as_str(), id.as_str()))
        .collect();

    xml.start("datasources", &[])?;
    for (datasource, id) in workbook.datasources.iter().zip(ids.iter()) {
        write_datasource(&mut xml, datasource, id, mode)?;
    }
    xml.end("datasources")?;

    xml.start("worksheets", &[])?;
    for worksheet in &workbook.worksheets {
        let ds_id = id_by_name
            .get(worksheet.datasource.as_str())
            .copied()
            .ok_or_else(|| {
                PersistenceError::MalformedDocument(format!(
                    "worksheet '{}' is bound to unknown datasource '{}'",
                    worksheet.spec.name, worksheet.datasource
                ))
            })?;
        write_worksheet(&mut xml, worksheet, ds_id)?;
    }
    xml.end("worksheets")?;

    xml.start("dashboards", &[])?;
    for page in &workbook.dashboards {
        write_dashboard(&mut xml, page)?;
    }
    xml.end("dashboards")?;

    write_windows(&mut xml, workbook)?;

    xml.end("workbook")?;

    let bytes = xml.into_bytes();
    tracing::debug!(bytes = bytes.len(), "workbook document serialized");
    Ok(bytes)
}

fn write_datasource(
    xml: &mut XmlOut,
    datasource: &Datasource,
    id: &str,
    mode: ConnectionMode,
) -> Result<(), PersistenceError> {
    let internal_name = format!("federated.{}", id);
    xml.start(
        "datasource",
        &[
            ("caption", datasource.name.as_str()),
            ("name", internal_name.as_str()),
            ("version", "18.1"),
        ],
    )?;

    // Connection block: where the data lives.
    let filename = format!("{}.csv", id);
    let directory = match mode {
        ConnectionMode::Embedded => "Data",
        ConnectionMode::External => "",
    };
    xml.start("connection", &[("class", "federated")])?;
    xml.start("named-connections", &[])?;
    xml.start(
        "named-connection",
        &[("caption", datasource.name.as_str()), ("name", "textscan")],
    )?;
    xml.empty(
        "connection",
        &[
            ("class", "textscan"),
            ("directory", directory),
            ("filename", filename.as_str()),
        ],
    )?;
    xml.end("named-connection")?;
    xml.end("named-connections")?;
    let table = format!("[{}]", filename);
    xml.empty(
        "relation",
        &[
            ("connection", "textscan"),
            ("name", filename.as_str()),
            ("table", table.as_str()),
            ("type", "table"),
        ],
    )?;
    xml.end("connection")?;

    // Column metadata: plain fields first, then the surviving calculations.
    xml.start("metadata-records", &[])?;
    for (ordinal, field) in datasource.fields.iter().enumerate() {
        xml.start("metadata-record", &[("class", "column")])?;
        xml.text_element("remote-name", &field.name)?;
        xml.text_element("remote-type", field.data_kind.document_type())?;
        xml.text_element("local-name", &format!("[{}]", field.name))?;
        xml.text_element("parent-name", &format!("[{}]", filename))?;
        xml.text_element("remote-alias", &field.name)?;
        xml.text_element("ordinal", &ordinal.to_string())?;
        xml.text_element("local-type", field.data_kind.document_type())?;
        let aggregation = if field.is_measure() { "Sum" } else { "Count" };
        xml.text_element("aggregation", aggregation)?;
        let contains_null = if field.contains_null { "true" } else { "false" };
        xml.text_element("contains-null", contains_null)?;
        xml.end("metadata-record")?;
    }
    for (offset, calc) in datasource.valid_calculations().enumerate() {
        let ordinal = datasource.fields.len() + offset;
        let doc_type = match calc.role {
            FieldRole::Measure => "real",
            FieldRole::Dimension => "string",
        };
        xml.start("metadata-record", &[("class", "column")])?;
        xml.text_element("remote-name", &calc.name)?;
        xml.text_element("remote-type", doc_type)?;
        xml.text_element("local-name", &format!("[{}]", calc.name))?;
        xml.text_element("parent-name", &format!("[{}]", calc.name))?;
        xml.text_element("remote-alias", &calc.name)?;
        xml.text_element("ordinal", &ordinal.to_string())?;
        xml.text_element("local-type", doc_type)?;
        let aggregation = if calc.role == FieldRole::Measure {
            "Sum"
        } else {
            "Count"
        };
        xml.text_element("aggregation", aggregation)?;
        xml.text_element("contains-null", "false")?;
        // The formula text rides along as an escaped attribute.
        xml.empty(
            "calculation",
            &[("formula", calc.formula.as_str()), ("type", "tableau")],
        )?;
        xml.end("metadata-record")?;
    }
    xml.end("metadata-records")?;

    xml.start("column-instances", &[])?;
    for field in &datasource.fields {
        let bracketed = format!("[{}]", field.name);
        let instance_type = if field.is_dimension() {
            "nominal"
        } else {
            "quantitative"
        };
        xml.empty(
            "column-instance",
            &[
                ("column", bracketed.as_str()),
                ("derivation", "None"),
                ("name", bracketed.as_str()),
                ("pivot", "key"),
                ("type", instance_type),
            ],
        )?;
    }
    for calc in datasource.valid_calculations() {
        let bracketed = format!("[{}]", calc.name);
        let instance_type = if calc.role == FieldRole::Dimension {
            "nominal"
        } else {
            "quantitative"
        };
        xml.empty(
            "column-instance",
            &[
                ("column", bracketed.as_str()),
                ("derivation", "Calculation"),
                ("name", bracketed.as_str()),
                ("pivot", "key"),
                ("type", instance_type),
            ],
        )?;
    }
    xml.end("column-instances")?;

    xml.end("datasource")?;
    Ok(())
}

fn write_worksheet(
    xml: &mut XmlOut,
    worksheet: &Worksheet,
    ds_id: &str,
) -> Result<(), PersistenceError> {
    let spec = &worksheet.spec;
    let internal_name = format!("federated.{}", ds_id);

    xml.start("worksheet", &[("name", spec.name.as_str())])?;
    xml.start(
        "table",
        &[("name", spec.name.as_str()), ("show-empty", "true")],
    )?;
    xml.start("view", &[])?;

    xml.start("datasources", &[])?;
    xml.empty(
        "datasource",
        &[
            ("caption", worksheet.datasource.as_str()),
            ("name", internal_name.as_str()),
        ],
    )?;
    xml.end("datasources")?;

    xml.empty("aggregation", &[("value", "true")])?;

    xml.start("panes", &[])?;
    xml.start(
        "pane",
        &[("selection-relaxation-option", "selection-relaxation-allow")],
    )?;
    xml.empty("view", &[("name", spec.title.as_str())])?;
    xml.empty("mark", &[("class", spec.mark.document_class())])?;

    xml.start("encodings", &[])?;
    for (shelf, entries) in &spec.shelves {
        xml.start(shelf.document_name(), &[])?;
        for entry in entries {
            let reference = format!("[{}].[{}]", internal_name, entry.field);
            match entry.aggregation {
                Some(agg) => {
                    xml.start("column", &[("aggregation", agg.document_name())])?;
                    xml.text(&reference)?;
                    xml.end("column")?;
                }
                None => {
                    xml.text_element("column", &reference)?;
                }
            }
        }
        xml.end(shelf.document_name())?;
    }
    xml.end("encodings")?;

    xml.end("pane")?;
    xml.end("panes")?;
    xml.end("view")?;
    xml.end("table")?;

    xml.start("layout-options", &[])?;
    xml.start("title", &[])?;
    xml.start("formatted-text", &[])?;
    xml.text_element("run", &spec.title)?;
    xml.end("formatted-text")?;
    xml.end("title")?;
    xml.end("layout-options")?;

    xml.end("worksheet")?;
    Ok(())
}

fn write_dashboard(
    xml: &mut XmlOut,
    page: &engine::DashboardPage,
) -> Result<(), PersistenceError> {
    xml.start("dashboard", &[("name", page.name.as_str())])?;
    let maxheight = page.height.to_string();
    let maxwidth = page.width.to_string();
    xml.empty(
        "size",
        &[("maxheight", maxheight.as_str()), ("maxwidth", maxwidth.as_str())],
    )?;

    xml.start("view", &[])?;
    xml.start("zones", &[])?;
    for (index, zone) in page.zones.iter().enumerate() {
        let id = index.to_string();
        let x = zone.rect.x.to_string();
        let y = zone.rect.y.to_string();
        let w = zone.rect.w.to_string();
        let h = zone.rect.h.to_string();
        xml.start(
            "zone",
            &[
                ("id", id.as_str()),
                ("type", "layout-basic"),
                ("x", x.as_str()),
                ("y", y.as_str()),
                ("w", w.as_str()),
                ("h", h.as_str()),
            ],
        )?;
        xml.empty("worksheet", &[("name", zone.item.worksheet_name())])?;
        xml.end("zone")?;
    }
    xml.end("zones")?;

    xml.start("devicelayouts", &[])?;
    xml.empty(
        "devicelayout",
        &[("auto-generated", "true"), ("name", "Phone")],
    )?;
    xml.end("devicelayouts")?;
    xml.end("view")?;

    xml.end("dashboard")?;
    Ok(())
}

/// Desktop applications expect at least one window element.
fn write_windows(xml: &mut XmlOut, workbook: &Workbook) -> Result<(), PersistenceError> {
    let first = workbook
        .worksheets
        .first()
        .map(|w| w.spec.name.as_str())
        .unwrap_or("Sheet 1");

    xml.start("windows", &[])?;
    xml.start(
        "window",
        &[("class", "worksheet"), ("maximized", "true"), ("name", first)],
    )?;
    xml.start("cards", &[])?;
    xml.start("edge", &[("name", "left")])?;
    xml.start("strip", &[("size", "160")])?;
    xml.empty("card", &[("type", "data")])?;
    xml.end("strip")?;
    xml.end("edge")?;
    xml.end("cards")?;
    xml.end("window")?;
    xml.end("windows")?;
    Ok(())
}

/// Thin convenience wrapper around the quick-xml writer: elements with
/// attribute slices, with escaping handled by the library.
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        XmlOut {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn declaration(&mut self) -> Result<(), PersistenceError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(())
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PersistenceError> {
        let mut elem = BytesStart::new(name);
        for (key, value) in attrs {
            elem.push_attribute((*key, *value));
        }
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PersistenceError> {
        let mut elem = BytesStart::new(name);
        for (key, value) in attrs {
            elem.push_attribute((*key, *value));
        }
        self.writer.write_event(Event::Empty(elem))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), PersistenceError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), PersistenceError> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), PersistenceError> {
        self.start(name, &[])?;
        self.text(text)?;
        self.end(name)
    }

    fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}
