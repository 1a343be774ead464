//! FILENAME: persistence/src/lib.rs
//! Workbook Document Persistence
//!
//! Serializes the assembled workbook model into a TWB document and parses
//! documents back for the final integrity check. Packaging into the
//! archive form lives in the twbx-format crate.

mod error;
mod ids;
mod twb_reader;
mod twb_writer;

pub use error::PersistenceError;
pub use ids::{assign_ids, slugify, IdAllocator};
pub use twb_reader::{
    check_workbook_xml, parse_document, DeclaredDashboard, DeclaredDatasource, DeclaredWorksheet,
    DocumentSummary,
};
pub use twb_writer::write_workbook_xml;
