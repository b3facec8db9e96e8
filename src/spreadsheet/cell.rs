use crate::spreadsheet::number_format::format_number;
use chrono::NaiveDateTime;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

/// Runtime value of a cell.
#[derive(Clone, Debug)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Name of the value kind used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "date-time",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

// Numbers compare by bit pattern so that equality and hashing agree.
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left.to_bits() == right.to_bits(),
            (Self::Boolean(left), Self::Boolean(right)) => left == right,
            (Self::DateTime(left), Self::DateTime(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Text(text) => text.hash(state),
            Self::Number(number) => number.to_bits().hash(state),
            Self::Boolean(boolean) => boolean.hash(state),
            Self::DateTime(datetime) => datetime.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => f.write_str(&format_number(*number)),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// One cell of a header or data row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Zero-based physical column
    pub column_index: usize,
    /// Header text of the column for data cells, the cell reference for spreadsheet header cells
    pub column_header: String,
    pub raw_value: Option<CellValue>,
    pub formatted_value: Option<CellValue>,
    /// Number format pattern, set for date cells
    pub display_mask: Option<String>,
    pub numeric_format_code: u16,
}

impl Cell {
    /// Cell whose raw and formatted values are the same.
    pub fn new(column_index: usize, column_header: impl Into<String>, value: Option<CellValue>) -> Cell {
        Cell {
            column_index,
            column_header: column_header.into(),
            raw_value: value.clone(),
            formatted_value: value,
            display_mask: None,
            numeric_format_code: 0,
        }
    }

    /// Column name contributed by a header cell.
    pub fn header_text(&self) -> Option<String> {
        self.formatted_value
            .as_ref()
            .or(self.raw_value.as_ref())
            .map(|value| value.to_string().trim().to_owned())
            .filter(|text| !text.is_empty())
    }
}

/// Data row with its 1-based row number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Row {
    pub index: usize,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: usize, cells: Vec<Cell>) -> Row {
        Row { index, cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, column_index: usize) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.column_index == column_index)
    }
}

/// Rows of one delimited-text file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub index: usize,
    pub rows: Vec<Row>,
}

/// Excel error code as shown in the sheet.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Formatted value kept for error cells.
pub(crate) fn error_text(code: &str) -> CellValue {
    CellValue::Text(format!("ERROR:{code}"))
}
