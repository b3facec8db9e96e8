use serde::Deserialize;
use std::fmt;

/// Type a column value is converted into.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum TargetKind {
    String,
    Integer,
    Long,
    Decimal,
    Boolean,
    DateTime,
    /// Kind name the engine cannot produce; converting into it always fails
    Unsupported(String),
}

impl From<&str> for TargetKind {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "varchar" => Self::String,
            "integer" | "int" => Self::Integer,
            "long" | "bigint" => Self::Long,
            "decimal" | "bigdecimal" => Self::Decimal,
            "boolean" | "bool" => Self::Boolean,
            "datetime" | "date" | "timestamp" => Self::DateTime,
            _ => Self::Unsupported(name.to_owned()),
        }
    }
}

impl From<String> for TargetKind {
    fn from(name: String) -> Self {
        TargetKind::from(name.as_str())
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("String"),
            Self::Integer => f.write_str("Integer"),
            Self::Long => f.write_str("Long"),
            Self::Decimal => f.write_str("Decimal"),
            Self::Boolean => f.write_str("Boolean"),
            Self::DateTime => f.write_str("DateTime"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// Binds one source column to a typed attribute of the produced record.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ColumnMapping {
    /// Kind of record the mapping produces
    pub entity: String,
    pub attribute: String,
    /// Header text of the source column
    pub column_name: String,
    #[serde(rename = "type")]
    pub target: TargetKind,
}

impl ColumnMapping {
    pub fn new(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        column_name: impl Into<String>,
        target: TargetKind,
    ) -> Self {
        ColumnMapping {
            entity: entity.into(),
            attribute: attribute.into(),
            column_name: column_name.into(),
            target,
        }
    }
}

/// Column of a JSON-mapping import. The record key is the column header itself.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct JsonMappingElement {
    pub decoded_path: String,
    pub primitive_type: TargetKind,
}

impl JsonMappingElement {
    pub fn new(decoded_path: impl Into<String>, primitive_type: TargetKind) -> Self {
        JsonMappingElement {
            decoded_path: decoded_path.into(),
            primitive_type,
        }
    }
}
