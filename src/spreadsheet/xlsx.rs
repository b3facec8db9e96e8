//! Excel 2007+ (`.xlsx`) workbook reader.
//! Workbook structure, styles and shared strings are loaded on open; worksheets are streamed.

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::DocumentIssue;
use crate::error::ImportError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContent;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::error_text;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::number_cell;
use crate::spreadsheet::excel::open_package;
use crate::spreadsheet::handler::SheetContents;
use crate::spreadsheet::handler::SheetHandler;
use crate::spreadsheet::handler::XmlCell;
use crate::spreadsheet::handler::XmlCellKind;
use crate::spreadsheet::number_format::format_datetime;
use crate::spreadsheet::number_format::DateEpoch;
use crate::spreadsheet::number_format::NumberFormats;
use log::Level;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::mem;
use std::ops::ControlFlow;
use std::path::Path;
use zip::ZipArchive;

const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts";
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt";
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";
const TAG_FORMAT_INDEX: &[u8] = b"xf";
const TAG_SHARED_STRING_ITEM: &[u8] = b"si";
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";
const TAG_TEXT: &[u8] = b"t";
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";

pub struct XlsxWorkbook {
    zip: ZipArchive<BufReader<File>>,
    shared_strings: Vec<String>,
    number_formats: NumberFormats,
    epoch: DateEpoch,
    /// (sheet name, part path)
    sheets: Vec<(String, String)>,
}

impl XlsxWorkbook {
    /// Opens the package and loads relationships, sheet list, epoch flag, styles and shared strings.
    pub fn open(path: &Path, diagnostics: &dyn Diagnostics) -> Result<XlsxWorkbook, ImportError> {
        let mut zip = open_package(path)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        let number_formats = load_number_formats(&mut zip).with_prefix("Unable to read cell styles")?;
        let shared_strings = load_shared_strings(&mut zip).with_prefix("Unable to read shared strings")?;
        let epoch = DateEpoch::from_1904_flag(is_1904);
        diag!(diagnostics, Level::Debug,
            "Opened workbook '{}': {} sheets, {} shared strings, {} styles, {:?} dates",
            path.display(), sheets.len(), shared_strings.len(), number_formats.len(), epoch);

        Ok(XlsxWorkbook { zip, shared_strings, number_formats, epoch, sheets })
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    /// Sheet name as stored in the workbook and its part path; names compare case-insensitively.
    fn find_sheet(&self, name: &str) -> Result<(String, String), ImportError> {
        self.sheets
            .iter()
            .find(|(sheet_name, _)| sheet_name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ImportError::SheetNotFound { sheet: name.to_owned() })
    }

    /// Streams the worksheet through `contents`.
    fn stream(
        &mut self,
        path: &str,
        contents: &mut dyn SheetContents,
        diagnostics: &dyn Diagnostics,
    ) -> Result<(), ImportError> {
        let mut reader = self
            .zip
            .xml_reader(path)?
            .ok_or(ImportError::EncryptedOrCorruptDocument(DocumentIssue::UnreadableRecord))?;
        SheetHandler::new(&self.shared_strings, &self.number_formats, diagnostics).run(&mut reader, contents)
    }

    /// Header cells of a zero-based row. The stream stops as soon as the header row ends.
    pub fn read_header(
        &mut self,
        sheet: &str,
        header_row: usize,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Vec<Cell>, ImportError> {
        let (sheet_name, path) = self.find_sheet(sheet)?;
        let mut collector = HeaderCollector {
            header_row,
            sheet: sheet_name.to_owned(),
            epoch: self.epoch,
            cells: Vec::new(),
            is_found: false,
        };
        self.stream(&path, &mut collector, diagnostics)?;

        if !collector.is_found {
            return Err(ImportError::HeaderNotFound { sheet: sheet_name, row: header_row + 1 });
        }
        if collector.cells.is_empty() {
            return Err(ImportError::EmptyHeader { sheet: sheet_name });
        }
        diag!(diagnostics, Level::Trace, "Read {} header cells from sheet '{}'", collector.cells.len(), sheet_name);
        Ok(collector.cells)
    }

    /// Streams data rows from zero-based `start_row` on, restricted to the header's columns.
    /// Rows without any cell in those columns are not reported.
    pub fn read_rows(
        &mut self,
        sheet: &str,
        header: &[Cell],
        start_row: usize,
        diagnostics: &dyn Diagnostics,
        visit: &mut dyn FnMut(Row) -> Result<(), ImportError>,
    ) -> Result<(), ImportError> {
        let (sheet_name, path) = self.find_sheet(sheet)?;
        if header.is_empty() {
            Err(ImportError::EmptyHeader { sheet: sheet_name.to_owned() })?
        }
        let columns = header
            .iter()
            .map(|cell| (cell.column_index, cell.header_text().unwrap_or_default()))
            .collect();
        let mut collector = RowCollector {
            start_row,
            sheet: sheet_name,
            epoch: self.epoch,
            columns,
            cells: Vec::new(),
            visit,
            diagnostics,
        };
        self.stream(&path, &mut collector, diagnostics)
    }
}

/// Builds a cell from decoded XML content.
/// Cached formula errors are fatal, plain error cells keep an `ERROR:` text.
fn to_cell(cell: XmlCell, column_header: String, epoch: DateEpoch, sheet: &str) -> Result<Cell, ImportError> {
    match (cell.kind, cell.value) {
        (XmlCellKind::Error, _) if cell.is_formula => Err(ImportError::InvalidFormulaResult {
            reference: cell.reference,
            row: cell.row + 1,
            sheet: sheet.to_owned(),
        }),
        (XmlCellKind::Error, value) => {
            let mut result = Cell::new(cell.column, column_header, Some(value));
            result.formatted_value = Some(error_text(&cell.raw_value));
            Ok(result)
        }
        (_, CellValue::Number(value)) => Ok(number_cell(cell.column, column_header, value, &cell.format, epoch)),
        (_, CellValue::DateTime(datetime)) => {
            let mut result = Cell::new(cell.column, column_header, Some(CellValue::DateTime(datetime)));
            if cell.format.is_date {
                result.display_mask = Some(cell.format.code);
                result.numeric_format_code = cell.format.id;
            }
            Ok(result)
        }
        (_, value) => Ok(Cell::new(cell.column, column_header, Some(value))),
    }
}

struct HeaderCollector {
    header_row: usize,
    sheet: String,
    epoch: DateEpoch,
    cells: Vec<Cell>,
    is_found: bool,
}

impl SheetContents for HeaderCollector {
    fn start_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError> {
        if row > self.header_row {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }

    fn cell(&mut self, cell: XmlCell) -> Result<(), ImportError> {
        if cell.row != self.header_row {
            return Ok(());
        }
        let reference = cell.reference.to_owned();
        let mut cell = to_cell(cell, reference, self.epoch, &self.sheet)?;
        let text = match (&cell.formatted_value, &cell.display_mask) {
            (Some(CellValue::DateTime(datetime)), Some(mask)) => format_datetime(datetime, mask),
            (Some(value), _) => value.to_string(),
            (None, _) => String::new(),
        };
        let text = text.trim();
        if !text.is_empty() {
            cell.formatted_value = Some(CellValue::Text(text.to_owned()));
            self.cells.push(cell);
        }
        Ok(())
    }

    fn end_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError> {
        if row == self.header_row {
            self.is_found = true;
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}

struct RowCollector<'a, 'v> {
    start_row: usize,
    sheet: String,
    epoch: DateEpoch,
    /// column index -> header text
    columns: HashMap<usize, String>,
    cells: Vec<Cell>,
    visit: &'v mut dyn FnMut(Row) -> Result<(), ImportError>,
    diagnostics: &'a dyn Diagnostics,
}

impl SheetContents for RowCollector<'_, '_> {
    fn start_row(&mut self, _row: usize) -> Result<ControlFlow<()>, ImportError> {
        self.cells.clear();
        Ok(ControlFlow::Continue(()))
    }

    fn cell(&mut self, cell: XmlCell) -> Result<(), ImportError> {
        if cell.row < self.start_row {
            return Ok(());
        }
        if let Some(column_header) = self.columns.get(&cell.column) {
            let cell = to_cell(cell, column_header.to_owned(), self.epoch, &self.sheet)?;
            self.cells.push(cell);
        }
        Ok(())
    }

    fn end_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError> {
        if row >= self.start_row && !self.cells.is_empty() {
            diag!(self.diagnostics, Level::Trace, "Read row {} with {} cells", row + 1, self.cells.len());
            (self.visit)(Row::new(row + 1, mem::take(&mut self.cells)))?;
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Sheet list (name, part path) and the 1904 date flag.
/// A package without a workbook part is not a spreadsheet.
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), ImportError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or(ImportError::EncryptedOrCorruptDocument(DocumentIssue::NotOfficeDocument))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id: Option<Cow<str>> = event.get_local_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&*id) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Number format of every cell style, resolved against the custom formats.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<NumberFormats, ImportError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(NumberFormats::default()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<u16, String>::new();
    let mut format_indexes_context = false;
    let mut format_ids = Vec::<u16>::new();

    match_xml_events!(reader => {
        Event::Start(event) => match event.local_name().as_ref() {
            TAG_CUSTOM_FORMATS => custom_formats_context = true,
            TAG_CUSTOM_FORMAT if custom_formats_context => {
                let id = event.parse_attribute_value::<u16>("numFmtId")?;
                let format = event.get_attribute_value("formatCode")?;
                if let Some((id, format)) = id.zip(format) {
                    custom_formats.insert(id, format.into_owned());
                }
            }
            TAG_FORMAT_INDEXES => format_indexes_context = true,
            TAG_FORMAT_INDEX if format_indexes_context => {
                format_ids.push(event.parse_attribute_value::<u16>("numFmtId")?.unwrap_or(0));
            }
            _ => (),
        },
        Event::End(event) => match event.local_name().as_ref() {
            TAG_CUSTOM_FORMATS => custom_formats_context = false,
            TAG_FORMAT_INDEXES => format_indexes_context = false,
            _ => (),
        },
    });

    Ok(NumberFormats::new(format_ids, &custom_formats))
}

fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, ImportError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM)?);
        }
    });
    Ok(shared_strings)
}

/// Concatenated `<t>` text up to `end_tag`, phonetic runs excluded.
fn read_string_value<R: BufRead>(reader: &mut XmlReader<R>, end_tag: &[u8]) -> Result<String, ImportError> {
    let mut is_phonetic_text = false;
    let mut is_text = false;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
        event if is_text => {
            text.push_content(&event)?;
        }
    });
    Ok(text)
}
