//! Delimited text reader. The whole file is read into one [`Table`].

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::ImportError;
use crate::settings::CsvSettings;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::cell::Table;
use log::Level;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::Path;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Header cells and data rows of one delimited file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsvContent {
    pub header: Vec<Cell>,
    pub table: Table,
}

fn to_byte(name: &str, character: char) -> Result<u8, ImportError> {
    if character.is_ascii() {
        Ok(character as u8)
    } else {
        Err(ImportError::InvalidCsvFormat(format!("{name} '{character}' must be a single-byte character")))
    }
}

/// Reader configured for the dialect. When quote and escape are the same character,
/// escaping falls back to doubled quotes.
fn reader_builder(settings: &CsvSettings) -> Result<csv::ReaderBuilder, ImportError> {
    if settings.quote.is_none() && settings.escape.is_none() {
        Err(ImportError::InvalidCsvFormat("quote and escape characters cannot both be empty".to_owned()))?
    }

    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(to_byte("delimiter", settings.delimiter)?);
    match settings.quote {
        Some(quote) => builder.quote(to_byte("quote", quote)?).quoting(true),
        None => builder.quoting(false),
    };
    match settings.escape {
        Some(escape) if Some(escape) != settings.quote => {
            builder.escape(Some(to_byte("escape", escape)?)).double_quote(false)
        }
        _ => builder.escape(None).double_quote(true),
    };
    Ok(builder)
}

/// Reads a delimited file: record 1 names the columns, the rest are data rows.
/// `expected` names are checked against the header before any data row is read.
pub fn read_table(
    path: &Path,
    settings: &CsvSettings,
    expected: &[String],
    diagnostics: &dyn Diagnostics,
) -> Result<CsvContent, ImportError> {
    let builder = reader_builder(settings)?;
    let file = File::open(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => ImportError::FileNotFound { path: path.display().to_string() },
        _ => ImportError::Io(error),
    })?;
    let mut reader = builder.from_reader(BufReader::new(file));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut records = reader.records().enumerate();
    let header_record = match records.next() {
        Some((_, record)) => record.map_err(|error| parse_error(1, error))?,
        None => Err(ImportError::EmptyHeader { sheet: file_name.to_owned() })?,
    };
    let names: Vec<String> = header_record
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let name = if index == 0 { name.trim_start_matches(BYTE_ORDER_MARK) } else { name };
            name.trim().to_owned()
        })
        .collect();
    let columns: Vec<String> = if settings.header_is_data {
        (1..=names.len()).map(|index| index.to_string()).collect()
    } else {
        names.to_owned()
    };
    if columns.iter().all(String::is_empty) {
        Err(ImportError::EmptyHeader { sheet: file_name.to_owned() })?
    }
    validate_header(&columns, expected)?;
    diag!(diagnostics, Level::Debug, "File '{}' has {} columns", file_name, columns.len());

    let header = names
        .iter()
        .zip(&columns)
        .enumerate()
        .map(|(index, (name, column))| {
            let mut cell = Cell::new(index, column.to_owned(), Some(CellValue::Text(column.to_owned())));
            cell.raw_value = Some(CellValue::Text(name.to_owned()));
            cell
        })
        .collect();

    let mut rows = Vec::new();
    if settings.header_is_data {
        rows.push(to_row(1, &header_record, &columns)?);
    }
    for (index, record) in records {
        let row = index + 1;
        let record = record.map_err(|error| parse_error(row, error))?;
        rows.push(to_row(row, &record, &columns)?);
    }
    diag!(diagnostics, Level::Trace, "Read {} rows from '{}'", rows.len(), file_name);

    Ok(CsvContent { header, table: Table { index: 0, rows } })
}

/// Every expected column must exist; the column count is checked first.
fn validate_header(columns: &[String], expected: &[String]) -> Result<(), ImportError> {
    if expected.len() > columns.len() {
        Err(ImportError::StructuralMismatch { expected: expected.len(), actual: columns.len() })?
    }
    if let Some(missing) = expected.iter().find(|name| !columns.contains(name)) {
        Err(ImportError::HeaderMismatch { column: missing.to_owned() })?
    }
    Ok(())
}

fn to_row(row: usize, record: &csv::StringRecord, columns: &[String]) -> Result<Row, ImportError> {
    if record.len() > columns.len() {
        Err(ImportError::RowParseError {
            row,
            message: format!("found {} fields but the header has {} columns", record.len(), columns.len()),
        })?
    }
    let cells = record
        .iter()
        .zip(columns)
        .enumerate()
        .map(|(index, (field, column))| Cell {
            column_index: index,
            column_header: column.to_owned(),
            raw_value: (!field.is_empty()).then(|| CellValue::Text(field.to_owned())),
            formatted_value: None,
            display_mask: None,
            numeric_format_code: 0,
        })
        .collect();
    Ok(Row::new(row, cells))
}

fn parse_error(row: usize, error: csv::Error) -> ImportError {
    ImportError::RowParseError { row, message: error.to_string() }
}
