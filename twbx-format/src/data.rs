//! FILENAME: twbx-format/src/data.rs
//! PURPOSE: Serializes a dataset's rows into the embedded CSV form.
//! CONTEXT: One CSV per datasource goes into the archive under Data/.
//! Columns follow the normalized field list; each field pulls its value
//! by source ordinal, so columns the normalizer skipped are simply left
//! out of the embedded file. Nulls become empty cells.

use crate::error::FormatError;
use engine::{DataValue, FieldDefinition, TabularDataset};

/// Renders the embedded CSV for one datasource.
pub fn dataset_csv(
    fields: &[FieldDefinition],
    dataset: &TabularDataset,
) -> Result<Vec<u8>, FormatError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(fields.iter().map(|f| f.name.as_str()))?;

    for row in &dataset.rows {
        let record: Vec<String> = fields
            .iter()
            .map(|field| {
                row.get(field.ordinal)
                    .unwrap_or(&DataValue::Null)
                    .to_string()
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| FormatError::Io(e.into_error()))
}
