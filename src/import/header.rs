use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::ImportError;
use crate::spreadsheet::cell::Cell;
use log::Level;

/// Checks that every expected column name appears in the header and returns the header names.
/// Names compare exactly against the trimmed display text of the header cells.
pub fn align(
    header: &[Cell],
    expected: &[String],
    sheet: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<String>, ImportError> {
    let names: Vec<String> = header.iter().filter_map(Cell::header_text).collect();
    if names.is_empty() {
        Err(ImportError::EmptyHeader { sheet: sheet.to_owned() })?
    }
    diag!(diagnostics, Level::Trace, "Found {} columns in sheet '{}'", names.len(), sheet);

    if let Some(missing) = expected.iter().find(|name| !names.contains(name)) {
        Err(ImportError::ColumnNotFound { name: missing.to_owned(), sheet: sheet.to_owned() })?
    }
    Ok(names)
}
