//! Picks the reader for a file and adapts it to [`RowSource`].

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::ImportError;
use crate::settings::ImportSettings;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::csv::read_table;
use crate::spreadsheet::csv::CsvContent;
use crate::spreadsheet::xls::XlsWorkbook;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use crate::spreadsheet::RowSource;
use crate::spreadsheet::SourceFormat;
use log::Level;
use std::mem;
use std::path::Path;

/// File formats the importer can read, told apart by extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Xls,
    Xlsx,
    Csv,
}

impl FileFormat {
    pub fn from_file_name(name: &str) -> Result<FileFormat, ImportError> {
        let extension = Path::new(name)
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("xls") => Ok(FileFormat::Xls),
            Some("xlsx") => Ok(FileFormat::Xlsx),
            Some("csv") => Ok(FileFormat::Csv),
            _ => Err(ImportError::UnsupportedFileType { name: name.to_owned() }),
        }
    }
}

/// Zero-based index of a 1-based row setting.
fn zero_based(row: usize) -> Result<usize, ImportError> {
    row.checked_sub(1).ok_or(ImportError::InvalidRowIndex { row: 0 })
}

/// Opens `path` with the reader matching its extension.
/// `expected` column names are handed to readers that validate the header while reading.
pub fn open_source<'a>(
    path: &Path,
    settings: &ImportSettings,
    expected: &[String],
    diagnostics: &'a dyn Diagnostics,
) -> Result<Box<dyn RowSource + 'a>, ImportError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = FileFormat::from_file_name(&name)?;
    if !path.is_file() {
        Err(ImportError::FileNotFound { path: path.display().to_string() })?
    }
    diag!(diagnostics, Level::Debug, "Opening '{}' as {:?}", name, format);

    let source: Box<dyn RowSource + 'a> = match format {
        FileFormat::Xls => {
            let sheet = settings.sheet();
            let mut workbook = XlsWorkbook::open(path, diagnostics)?;
            workbook.open_sheet(&sheet.sheet_name, diagnostics)?;
            Box::new(XlsRowSource {
                sheet_name: workbook.sheet_name().unwrap_or(&sheet.sheet_name).to_owned(),
                workbook,
                header_row: zero_based(sheet.header_row)?,
                data_row: zero_based(sheet.data_row)?,
            })
        }
        FileFormat::Xlsx => {
            let sheet = settings.sheet();
            let workbook = XlsxWorkbook::open(path, diagnostics)?;
            let sheet_name = workbook
                .sheet_names()
                .find(|candidate| candidate.eq_ignore_ascii_case(&sheet.sheet_name))
                .map(str::to_owned)
                .ok_or_else(|| ImportError::SheetNotFound { sheet: sheet.sheet_name.to_owned() })?;
            Box::new(XlsxRowSource {
                workbook,
                sheet_name,
                header_row: zero_based(sheet.header_row)?,
                data_row: zero_based(sheet.data_row)?,
                diagnostics,
            })
        }
        FileFormat::Csv => Box::new(CsvRowSource {
            content: read_table(path, &settings.csv(), expected, diagnostics)?,
            file_name: name,
        }),
    };
    Ok(source)
}

struct XlsRowSource {
    workbook: XlsWorkbook,
    sheet_name: String,
    header_row: usize,
    data_row: usize,
}

impl RowSource for XlsRowSource {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }

    fn header(&mut self) -> Result<Vec<Cell>, ImportError> {
        self.workbook.read_header_row(self.header_row)
    }

    fn for_each_row(
        &mut self,
        header: &[Cell],
        visit: &mut dyn FnMut(Row) -> Result<(), ImportError>,
    ) -> Result<(), ImportError> {
        let Some(last_row) = self.workbook.last_row_index() else {
            return Ok(());
        };
        for index in self.data_row..=last_row {
            let row = self.workbook.read_data_row(index as i64, header)?;
            if !row.is_empty() {
                visit(row)?;
            }
        }
        Ok(())
    }
}

struct XlsxRowSource<'a> {
    workbook: XlsxWorkbook,
    sheet_name: String,
    header_row: usize,
    data_row: usize,
    diagnostics: &'a dyn Diagnostics,
}

impl RowSource for XlsxRowSource<'_> {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }

    fn header(&mut self) -> Result<Vec<Cell>, ImportError> {
        self.workbook.read_header(&self.sheet_name, self.header_row, self.diagnostics)
    }

    fn for_each_row(
        &mut self,
        header: &[Cell],
        visit: &mut dyn FnMut(Row) -> Result<(), ImportError>,
    ) -> Result<(), ImportError> {
        self.workbook
            .read_rows(&self.sheet_name, header, self.data_row, self.diagnostics, visit)
    }
}

struct CsvRowSource {
    content: CsvContent,
    file_name: String,
}

impl RowSource for CsvRowSource {
    fn sheet_name(&self) -> &str {
        &self.file_name
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::DelimitedText
    }

    fn header(&mut self) -> Result<Vec<Cell>, ImportError> {
        Ok(self.content.header.to_owned())
    }

    /// Hands out the buffered rows; a second pass sees none.
    fn for_each_row(
        &mut self,
        _header: &[Cell],
        visit: &mut dyn FnMut(Row) -> Result<(), ImportError>,
    ) -> Result<(), ImportError> {
        for row in mem::take(&mut self.content.table.rows) {
            visit(row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NoDiagnostics;
    use crate::settings::CsvSettings;
    use crate::settings::SheetSettings;
    use crate::spreadsheet::cell::CellValue;
    use crate::spreadsheet::xls::tests::XlsBuilder;
    use crate::spreadsheet::xlsx::tests::package;
    use std::io::Write;

    fn collect(source: &mut dyn RowSource) -> Result<Vec<Row>, ImportError> {
        let header = source.header()?;
        let mut rows = Vec::new();
        source.for_each_row(&header, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    #[test]
    fn file_format_by_extension() {
        assert_eq!(FileFormat::from_file_name("data.XLSX").ok(), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::from_file_name("old.xls").ok(), Some(FileFormat::Xls));
        assert_eq!(FileFormat::from_file_name("list.Csv").ok(), Some(FileFormat::Csv));
        assert!(matches!(FileFormat::from_file_name("notes.txt"), Err(ImportError::UnsupportedFileType { .. })));
        assert!(matches!(FileFormat::from_file_name("README"), Err(ImportError::UnsupportedFileType { .. })));
    }

    #[test]
    fn missing_file() {
        let settings = ImportSettings::Csv(CsvSettings::default());
        let result = open_source(Path::new("/nonexistent/people.xlsx"), &settings, &[], &NoDiagnostics);
        assert!(matches!(result, Err(ImportError::FileNotFound { .. })));
    }

    #[test]
    fn zero_row_setting_is_invalid() -> Result<(), ImportError> {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("people.xlsx");
        std::fs::write(&path, package("Sheet1", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c></row>"#, &[], false))?;
        let settings = ImportSettings::Sheet(SheetSettings { header_row: 0, ..Default::default() });
        let result = open_source(&path, &settings, &[], &NoDiagnostics);
        assert!(matches!(result, Err(ImportError::InvalidRowIndex { row: 0 })));
        Ok(())
    }

    #[test]
    fn xls_rows_skip_empty_lines() -> Result<(), ImportError> {
        let mut builder = XlsBuilder::new();
        let sheet = builder.sheet("People");
        builder
            .text(sheet, 0, 0, "Name")
            .text(sheet, 0, 1, "Age")
            .text(sheet, 1, 0, "Ann")
            .integer(sheet, 1, 1, 30, 0)
            .text(sheet, 2, 3, "ignored")
            .text(sheet, 3, 0, "Bob");
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("people.xls");
        builder.write(&path)?;

        let settings = ImportSettings::Sheet(SheetSettings::new("people"));
        let mut source = open_source(&path, &settings, &[], &NoDiagnostics)?;
        assert_eq!(source.sheet_name(), "People");
        assert_eq!(source.source_format(), SourceFormat::Spreadsheet);
        let rows = collect(source.as_mut())?;
        assert_eq!(rows.iter().map(|row| row.index).collect::<Vec<_>>(), [2, 4]);
        assert_eq!(rows[0].cells[1].formatted_value, Some(CellValue::Number(30.0)));
        Ok(())
    }

    #[test]
    fn xlsx_rows() -> Result<(), ImportError> {
        let rows_xml = r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>30</v></c></row>"#;
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("people.xlsx");
        std::fs::write(&path, package("People", rows_xml, &["Name", "Age", "Ann"], false))?;

        let settings = ImportSettings::Sheet(SheetSettings::new("PEOPLE"));
        let mut source = open_source(&path, &settings, &[], &NoDiagnostics)?;
        assert_eq!(source.sheet_name(), "People");
        let rows = collect(source.as_mut())?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[0].column_header, "Name");
        assert_eq!(rows[0].cells[0].formatted_value, Some(CellValue::Text("Ann".to_owned())));
        Ok(())
    }

    #[test]
    fn csv_rows_are_handed_out_once() -> Result<(), ImportError> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        file.write_all(b"Name,Age\nAnn,30\nBob,41\n")?;
        let settings = ImportSettings::Csv(CsvSettings::default());
        let mut source = open_source(file.path(), &settings, &["Age".to_owned()], &NoDiagnostics)?;
        assert_eq!(source.source_format(), SourceFormat::DelimitedText);
        assert_eq!(collect(source.as_mut())?.len(), 2);
        assert!(collect(source.as_mut())?.is_empty());
        Ok(())
    }
}
