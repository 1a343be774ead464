//! FILENAME: engine/src/field.rs
//! PURPOSE: Canonical field definitions and the tagged data value type.
//! CONTEXT: Everything downstream of schema normalization (calculations,
//! shelf mapping, serialization, embedding) speaks in these types. A
//! FieldDefinition is immutable once produced by the normalizer.

use serde::{Deserialize, Serialize};

/// The canonical data types a field can carry in the generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
}

impl DataKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataKind::Integer | DataKind::Float)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, DataKind::Date | DataKind::Datetime)
    }

    /// The type name used in the document markup.
    /// Floats are "real" there; dates keep their own type.
    pub fn document_type(self) -> &'static str {
        match self {
            DataKind::String => "string",
            DataKind::Integer => "integer",
            DataKind::Float => "real",
            DataKind::Boolean => "boolean",
            DataKind::Date => "date",
            DataKind::Datetime => "datetime",
        }
    }
}

/// How a field behaves in a view: grouping axis or aggregated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Dimension,
    Measure,
}

/// Optional semantic classification that widens mapping options
/// (geographic fields unlock maps; identifiers are poor chart axes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticHint {
    Geographic,
    Identifier,
}

/// A normalized column: the unit the rest of the engine works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub role: FieldRole,
    pub data_kind: DataKind,
    pub hint: Option<SemanticHint>,
    pub contains_null: bool,
    /// Position in the source schema, 0-based. Stable across runs.
    pub ordinal: usize,
}

impl FieldDefinition {
    pub fn is_dimension(&self) -> bool {
        self.role == FieldRole::Dimension
    }

    pub fn is_measure(&self) -> bool {
        self.role == FieldRole::Measure
    }
}

/// A single embedded cell value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl DataValue {
    /// Parses a raw string into a value of the given kind.
    /// Empty input becomes Null for every kind; anything unparseable is
    /// an error so malformed uploads surface instead of silently turning
    /// into text.
    pub fn from_raw(kind: DataKind, raw: &str) -> Result<DataValue, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(DataValue::Null);
        }
        match kind {
            DataKind::String | DataKind::Date | DataKind::Datetime => {
                Ok(DataValue::Text(trimmed.to_string()))
            }
            DataKind::Integer => trimmed
                .parse::<i64>()
                .map(DataValue::Integer)
                .map_err(|_| format!("'{}' is not an integer", trimmed)),
            DataKind::Float => trimmed
                .parse::<f64>()
                .map(DataValue::Real)
                .map_err(|_| format!("'{}' is not a number", trimmed)),
            DataKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(DataValue::Bool(true)),
                "false" | "0" | "no" => Ok(DataValue::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
        }
    }

}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Null => Ok(()),
            DataValue::Integer(n) => write!(f, "{}", n),
            DataValue::Real(n) => write!(f, "{}", n),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::Bool(b) => write!(f, "{}", b),
        }
    }
}
