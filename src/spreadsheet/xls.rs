//! Excel 97-2003 (`.xls`) workbook reader.
//! The BIFF8 workbook stream is read fully into memory; one sheet at a time is loaded into a row map.

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::DocumentIssue;
use crate::error::ImportError;
use crate::error::ResultOptionChain;
use crate::helpers::biff8::Biff8Reader;
use crate::match_biff8_record;
use crate::spreadsheet::cell::error_text;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::Row;
use crate::spreadsheet::excel::number_cell;
use crate::spreadsheet::excel::open_compound_file;
use crate::spreadsheet::excel::unreadable;
use crate::spreadsheet::number_format::format_datetime;
use crate::spreadsheet::number_format::DateEpoch;
use crate::spreadsheet::number_format::NumberFormats;
use crate::spreadsheet::reference::index_to_reference;
use either::Either;
use log::Level;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const ARRAY: u16 = 545;
const TABLE: u16 = 566;
const RK: u16 = 638;
const SHARED_FORMULA: u16 = 1212;
const FORMAT: u16 = 1054;
const BOF: u16 = 2057;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Cell content as stored in the sheet substream.
#[derive(Clone, Debug, PartialEq)]
enum XlsValue {
    Text(String),
    Number { value: f64, style: usize },
    Boolean(bool),
    Error(u8),
    /// Cached formula result that is an error
    FormulaError(u8),
}

/// Cells of the opened sheet, keyed by zero-based row then column.
struct XlsSheet {
    name: String,
    rows: BTreeMap<usize, BTreeMap<usize, XlsValue>>,
}

pub struct XlsWorkbook {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: NumberFormats,
    epoch: DateEpoch,
    sheets: Vec<(String, usize)>,
    sheet: Option<XlsSheet>,
}

impl XlsWorkbook {
    /// Reads the container and the workbook globals: epoch, code page, formats, styles, strings and sheets.
    pub fn open(path: &Path, diagnostics: &dyn Diagnostics) -> Result<XlsWorkbook, ImportError> {
        let cfb = open_compound_file(std::fs::read(path)?)?;
        let mut reader = cfb
            .read("Workbook")
            .ok_none_else(|| cfb.read("Book"))
            .map_err(unreadable)?
            .map(Biff8Reader::new)
            .ok_or(ImportError::EncryptedOrCorruptDocument(DocumentIssue::UnreadableRecord))?;

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<u16, String> = HashMap::new();
        let mut format_ids: Vec<u16> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        let mut globals = || -> Result<(), ImportError> {
            match_biff8_record!(reader => {
                EOF => break,
                FILE_PASS => Err(ImportError::EncryptedOrCorruptDocument(DocumentIssue::PasswordProtected))?,
                DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
                CODE_PAGE => {
                    let code_page = reader.read_u16()?;
                    reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
                }
                FORMAT => {
                    let id = reader.read_u16()?;
                    let format = reader.read_xl_unicode_string()?;
                    custom_formats.insert(id, format);
                }
                XF => {
                    reader.skip(2)?;
                    format_ids.push(reader.read_u16()?);
                }
                SST => shared_strings = load_shared_strings(&mut reader)?,
                BOUND_SHEET8 => {
                    let pointer = reader.read_usize()?;
                    reader.skip(2)?;
                    let sheet_name = reader.read_short_xl_unicode_string()?;
                    sheets.push((sheet_name, pointer));
                }
            });
            Ok(())
        };
        globals().map_err(unreadable)?;

        let epoch = DateEpoch::from_1904_flag(is_1904);
        diag!(diagnostics, Level::Debug,
            "Opened workbook '{}': {} sheets, {} shared strings, {} styles, {:?} dates",
            path.display(), sheets.len(), shared_strings.len(), format_ids.len(), epoch);

        Ok(XlsWorkbook {
            reader,
            shared_strings,
            number_formats: NumberFormats::new(format_ids, &custom_formats),
            epoch,
            sheets,
            sheet: None,
        })
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    /// Loads every cell of the named sheet; names compare case-insensitively.
    pub fn open_sheet(&mut self, name: &str, diagnostics: &dyn Diagnostics) -> Result<(), ImportError> {
        let (sheet_name, pointer) = self
            .sheets
            .iter()
            .find(|(sheet_name, _)| sheet_name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ImportError::SheetNotFound { sheet: name.to_owned() })?;

        let rows = self.load_rows(pointer, diagnostics).map_err(unreadable)?;
        diag!(diagnostics, Level::Debug, "Loaded sheet '{}' with {} rows", sheet_name, rows.len());
        self.sheet = Some(XlsSheet { name: sheet_name, rows });
        Ok(())
    }

    fn load_rows(
        &mut self,
        pointer: usize,
        diagnostics: &dyn Diagnostics,
    ) -> Result<BTreeMap<usize, BTreeMap<usize, XlsValue>>, ImportError> {
        let reader = &mut self.reader;
        let mut rows: BTreeMap<usize, BTreeMap<usize, XlsValue>> = BTreeMap::new();
        reader.goto(pointer);
        reader.next()?;
        while let Some(kind) = reader.next()? {
            match kind {
                BOF | EOF => break,
                MUL_RK => {
                    let row = reader.read_u16()? as usize;
                    let col_lower_bound = reader.read_u16()? as usize;
                    let col_upper_bound = reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let style = reader.read_u16()? as usize;
                        let value = reader.read_rk_number()?;
                        rows.entry(row).or_default().insert(col, XlsValue::Number { value, style });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = reader.read_u16()? as usize;
                    let col = reader.read_u16()? as usize;
                    let value = match kind {
                        BOOL_ERR => read_bool_or_error_cell(reader)?,
                        NUMBER => read_number_cell(reader)?,
                        RK => read_rk_cell(reader)?,
                        LABEL_SST => {
                            let index = read_label_sst_cell(reader)?;
                            match self.shared_strings.get(index) {
                                Some(text) => Some(XlsValue::Text(text.to_owned())),
                                None => {
                                    diag!(diagnostics, Level::Warn,
                                        "Skipping cell {}: shared string index {} is out of range",
                                        index_to_reference(row, col), index);
                                    None
                                }
                            }
                        }
                        LABEL => read_label_cell(reader)?,
                        _ => read_formula_cell(reader)?,
                    };
                    if let Some(value) = value {
                        rows.entry(row).or_default().insert(col, value);
                    }
                }
                _ => (),
            }
        }
        Ok(rows)
    }

    fn current_sheet(&self) -> Result<&XlsSheet, ImportError> {
        self.sheet.as_ref().ok_or(ImportError::SheetNotOpened)
    }

    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet.as_ref().map(|sheet| sheet.name.as_str())
    }

    /// Zero-based index of the last row holding a cell.
    pub fn last_row_index(&self) -> Option<usize> {
        self.sheet
            .as_ref()
            .and_then(|sheet| sheet.rows.last_key_value())
            .map(|(row, _)| *row)
    }

    /// Header cells of a zero-based row: trimmed display text, keyed by their A1 reference.
    pub fn read_header_row(&self, row_index: usize) -> Result<Vec<Cell>, ImportError> {
        let sheet = self.current_sheet()?;
        let row = sheet
            .rows
            .get(&row_index)
            .ok_or(ImportError::RowNotFound { row: row_index + 1 })?;

        let mut cells = Vec::with_capacity(row.len());
        for (col, value) in row {
            let reference = index_to_reference(row_index, *col);
            let mut cell = self.to_cell(sheet, row_index, *col, reference, value)?;
            let text = match (&cell.formatted_value, &cell.display_mask) {
                (Some(CellValue::DateTime(datetime)), Some(mask)) => Some(format_datetime(datetime, mask)),
                (Some(value), _) => Some(value.to_string()),
                (None, _) => None,
            };
            if let Some(text) = text.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty()) {
                cell.formatted_value = Some(CellValue::Text(text));
                cells.push(cell);
            }
        }
        if cells.is_empty() {
            Err(ImportError::EmptyHeader { sheet: sheet.name.to_owned() })?
        }
        Ok(cells)
    }

    /// Cells of a zero-based row restricted to the header's columns.
    /// Rows past the last physical row are empty.
    pub fn read_data_row(&self, row_index: i64, header: &[Cell]) -> Result<Row, ImportError> {
        let row_index = usize::try_from(row_index).map_err(|_| ImportError::InvalidRowIndex { row: row_index })?;
        let sheet = self.current_sheet()?;
        let mut cells = Vec::new();
        if let Some(row) = sheet.rows.get(&row_index) {
            for header_cell in header {
                let Some(value) = row.get(&header_cell.column_index) else {
                    continue;
                };
                let column_header = header_cell.header_text().unwrap_or_default();
                cells.push(self.to_cell(sheet, row_index, header_cell.column_index, column_header, value)?);
            }
        }
        Ok(Row::new(row_index + 1, cells))
    }

    fn to_cell(
        &self,
        sheet: &XlsSheet,
        row: usize,
        col: usize,
        column_header: String,
        value: &XlsValue,
    ) -> Result<Cell, ImportError> {
        let cell = match value {
            XlsValue::Text(text) => Cell::new(col, column_header, Some(CellValue::Text(text.to_owned()))),
            XlsValue::Number { value, style } => {
                let format = self.number_formats.get_or_general(*style);
                number_cell(col, column_header, *value, &format, self.epoch)
            }
            XlsValue::Boolean(value) => Cell::new(col, column_header, Some(CellValue::Boolean(*value))),
            XlsValue::Error(code) => {
                let code = to_error_value(*code);
                let mut cell = Cell::new(col, column_header, Some(CellValue::Text(code.to_owned())));
                cell.formatted_value = Some(error_text(code));
                cell
            }
            XlsValue::FormulaError(_) => Err(ImportError::InvalidFormulaResult {
                reference: index_to_reference(row, col),
                row: row + 1,
                sheet: sheet.name.to_owned(),
            })?,
        };
        Ok(cell)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, ImportError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(u16::MAX as usize));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<Option<XlsValue>, ImportError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    let value = if flag == 0 { XlsValue::Boolean(value != 0) } else { XlsValue::Error(value) };
    Ok(Some(value))
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<Option<XlsValue>, ImportError> {
    let style = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok(Some(XlsValue::Number { value, style }))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<Option<XlsValue>, ImportError> {
    let style = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok(Some(XlsValue::Number { value, style }))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<usize, ImportError> {
    reader.skip(2)?;
    reader.read_usize()
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<Option<XlsValue>, ImportError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok(Some(XlsValue::Text(value)))
}

/// Cached result of a formula: number, string (in the following STRING record), boolean, error or empty.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<Option<XlsValue>, ImportError> {
    let style = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let result = if is_number {
        Either::Left(f64::from_bits(formula))
    } else {
        Either::Right(formula & 0xFF)
    };
    match result {
        Either::Left(value) => Ok(Some(XlsValue::Number { value, style })),
        Either::Right(0) => {
            while let Some(kind) = reader.next()? {
                match kind {
                    STRING => {
                        let value = reader.read_xl_unicode_string()?;
                        return Ok((!value.is_empty()).then_some(XlsValue::Text(value)));
                    }
                    SHARED_FORMULA | ARRAY | TABLE => continue,
                    _ => break,
                }
            }
            Err(XlsError::FormulaValueError(formula))?
        }
        Either::Right(1) => Ok(Some(XlsValue::Boolean((formula & 0xFF0000) > 0))),
        Either::Right(2) => Ok(Some(XlsValue::FormulaError(((formula >> 16) & 0xFF) as u8))),
        Either::Right(3) => Ok(None),
        Either::Right(_) => Err(XlsError::FormulaValueError(formula))?,
    }
}
