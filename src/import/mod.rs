//! Turns the rows of a file into typed records.
//!
//! [`Importer`] opens the file with the reader matching its extension, checks the header against
//! the mapped column names and converts every data row, stopping at the first failure.

pub mod convert;
pub mod header;
pub mod mapping;
pub mod record;
pub mod source;

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::LogDiagnostics;
use crate::error::ImportError;
use crate::import::mapping::ColumnMapping;
use crate::import::mapping::JsonMappingElement;
use crate::import::record::assemble;
use crate::import::record::assemble_json;
use crate::import::record::Record;
use crate::import::source::open_source;
use crate::settings::ImportSettings;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::SourceFormat;
use log::Level;
use std::path::Path;

static DEFAULT_DIAGNOSTICS: LogDiagnostics = LogDiagnostics::new("sheet_import");

/// Runs imports, reporting progress and failures to its diagnostic sink.
#[derive(Copy, Clone)]
pub struct Importer<'a> {
    diagnostics: &'a dyn Diagnostics,
}

impl Default for Importer<'static> {
    fn default() -> Self {
        Importer::new(&DEFAULT_DIAGNOSTICS)
    }
}

impl<'a> Importer<'a> {
    pub fn new(diagnostics: &'a dyn Diagnostics) -> Self {
        Importer { diagnostics }
    }

    /// Imports every data row of `path` into a record built from `mappings`.
    pub fn import(
        &self,
        path: impl AsRef<Path>,
        settings: &ImportSettings,
        mappings: &[ColumnMapping],
    ) -> Result<Vec<Record>, ImportError> {
        let expected: Vec<String> = mappings.iter().map(|mapping| mapping.column_name.to_owned()).collect();
        self.run(path.as_ref(), settings, &expected, |row, format| assemble(row, mappings, format))
    }

    /// Imports every data row of `path` into a record keyed by column header.
    /// See [`record::records_to_json`] for the JSON rendering.
    pub fn import_json(
        &self,
        path: impl AsRef<Path>,
        settings: &ImportSettings,
        elements: &[JsonMappingElement],
    ) -> Result<Vec<Record>, ImportError> {
        let expected: Vec<String> = elements.iter().map(|element| element.decoded_path.trim().to_owned()).collect();
        self.run(path.as_ref(), settings, &expected, |row, format| assemble_json(row, elements, format))
    }

    fn run<F>(&self, path: &Path, settings: &ImportSettings, expected: &[String], build: F) -> Result<Vec<Record>, ImportError>
    where
        F: Fn(&Row, SourceFormat) -> Result<Record, ImportError>,
    {
        self.read_records(path, settings, expected, build).inspect_err(|error| {
            diag!(self.diagnostics, Level::Error, "Import of '{}' failed: {}", path.display(), error);
        })
    }

    fn read_records<F>(&self, path: &Path, settings: &ImportSettings, expected: &[String], build: F) -> Result<Vec<Record>, ImportError>
    where
        F: Fn(&Row, SourceFormat) -> Result<Record, ImportError>,
    {
        let mut source = open_source(path, settings, expected, self.diagnostics)?;
        let header = source.header()?;
        header::align(&header, expected, source.sheet_name(), self.diagnostics)?;

        let format = source.source_format();
        let mut records = Vec::new();
        source.for_each_row(&header, &mut |row| {
            records.push(build(&row, format)?);
            Ok(())
        })?;
        diag!(self.diagnostics, Level::Info, "Imported {} records from '{}'", records.len(), source.sheet_name());
        Ok(records)
    }
}
