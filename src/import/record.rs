use crate::error::ImportError;
use crate::import::convert::convert;
use crate::import::convert::ConversionError;
use crate::import::convert::Value;
use crate::import::mapping::ColumnMapping;
use crate::import::mapping::JsonMappingElement;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::SourceFormat;
use std::collections::HashMap;

/// Typed values of one imported row, in mapping order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    /// Entity of the first mapping entry; JSON-mapping records have none
    pub kind: Option<String>,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields = self
            .fields
            .iter()
            .map(|(name, value)| (name.to_owned(), value.to_json()))
            .collect();
        serde_json::Value::Object(fields)
    }
}

fn cells_by_header(row: &Row) -> HashMap<&str, &Cell> {
    row.cells.iter().map(|cell| (cell.column_header.as_str(), cell)).collect()
}

fn conversion_error(row: &Row, column: &str) -> impl FnOnce(ConversionError) -> ImportError {
    let row = row.index;
    let column = column.to_owned();
    move |source| ImportError::Conversion { row, column, source }
}

/// Builds a record from the mapped columns of a row. Columns without a value are left out.
pub fn assemble(row: &Row, mappings: &[ColumnMapping], format: SourceFormat) -> Result<Record, ImportError> {
    let cells = cells_by_header(row);
    let mut record = Record {
        kind: mappings.first().map(|mapping| mapping.entity.to_owned()),
        fields: Vec::with_capacity(mappings.len()),
    };
    for mapping in mappings {
        let Some(cell) = cells.get(mapping.column_name.as_str()) else {
            continue;
        };
        let value = convert(cell, format, &mapping.target).map_err(conversion_error(row, &mapping.column_name))?;
        if let Some(value) = value {
            record.fields.push((mapping.attribute.to_owned(), value));
        }
    }
    Ok(record)
}

/// Builds a record keyed by trimmed column header for a JSON-mapping import.
pub fn assemble_json(row: &Row, elements: &[JsonMappingElement], format: SourceFormat) -> Result<Record, ImportError> {
    let cells: HashMap<&str, &Cell> = row
        .cells
        .iter()
        .map(|cell| (cell.column_header.trim(), cell))
        .collect();
    let mut record = Record::default();
    for element in elements {
        let Some(cell) = cells.get(element.decoded_path.trim()) else {
            continue;
        };
        let value = convert(cell, format, &element.primitive_type).map_err(conversion_error(row, &element.decoded_path))?;
        if let Some(value) = value {
            record.fields.push((cell.column_header.trim().to_owned(), value));
        }
    }
    Ok(record)
}

/// JSON array of the records, one object per record.
pub fn records_to_json(records: &[Record]) -> serde_json::Value {
    serde_json::Value::Array(records.iter().map(Record::to_json).collect())
}
