//! Event-driven worksheet parser for SpreadsheetML.
//!
//! [`SheetHandler`] walks the XML events of one worksheet part and reports rows and decoded cells
//! to a [`SheetContents`] receiver. The receiver can stop the stream early from `start_row` or
//! `end_row`. Elements are matched by local name so prefixed documents parse the same way.

use crate::diag;
use crate::diagnostics::Diagnostics;
use crate::error::ImportError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContent;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::number_format::NumberFormat;
use crate::spreadsheet::number_format::NumberFormats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use log::Level;
use quick_xml::events::Event;
use std::io::BufRead;
use std::mem;
use std::ops::ControlFlow;

const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_VALUE: &[u8] = b"v";
const TAG_FORMULA: &[u8] = b"f";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_TEXT: &[u8] = b"t";
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";

/// Element currently open inside a cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum TagKind {
    #[default]
    None,
    Value,
    InlineString,
    InlineText,
    Phonetic,
    Formula,
}

/// Cell data type declared by the `t` attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum XmlCellKind {
    Boolean,
    Error,
    SharedString,
    InlineString,
    FormulaString,
    Number,
    IsoDate,
}

impl XmlCellKind {
    fn parse(kind: Option<&str>) -> XmlCellKind {
        match kind {
            Some("b") => Self::Boolean,
            Some("e") => Self::Error,
            Some("s") => Self::SharedString,
            Some("inlineStr") => Self::InlineString,
            Some("str") => Self::FormulaString,
            Some("d") => Self::IsoDate,
            _ => Self::Number,
        }
    }
}

/// Decoded cell reported to [`SheetContents::cell`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct XmlCell {
    pub(crate) reference: String,
    /// Zero-based row
    pub(crate) row: usize,
    /// Zero-based column
    pub(crate) column: usize,
    pub(crate) kind: XmlCellKind,
    /// An `<f>` element was present; the value is the cached result
    pub(crate) is_formula: bool,
    /// Text of `<v>` or of the inline string
    pub(crate) raw_value: String,
    pub(crate) value: CellValue,
    pub(crate) format: NumberFormat,
}

/// Receiver of worksheet content. Rows are zero-based.
pub(crate) trait SheetContents {
    fn start_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError>;

    fn cell(&mut self, cell: XmlCell) -> Result<(), ImportError>;

    fn end_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError>;
}

#[derive(Debug)]
struct PendingCell {
    row: usize,
    column: usize,
    kind: XmlCellKind,
    style: usize,
    is_formula: bool,
    value: Option<String>,
}

pub(crate) struct SheetHandler<'a> {
    shared_strings: &'a [String],
    number_formats: &'a NumberFormats,
    diagnostics: &'a dyn Diagnostics,
    tag: TagKind,
    row: usize,
    next_row: usize,
    next_column: usize,
    cell: Option<PendingCell>,
    text: String,
}

impl<'a> SheetHandler<'a> {
    pub(crate) fn new(
        shared_strings: &'a [String],
        number_formats: &'a NumberFormats,
        diagnostics: &'a dyn Diagnostics,
    ) -> SheetHandler<'a> {
        SheetHandler {
            shared_strings,
            number_formats,
            diagnostics,
            tag: TagKind::None,
            row: 0,
            next_row: 0,
            next_column: 0,
            cell: None,
            text: String::new(),
        }
    }

    /// Streams the worksheet until its end or until `contents` breaks.
    pub(crate) fn run<R: BufRead>(
        &mut self,
        reader: &mut XmlReader<R>,
        contents: &mut dyn SheetContents,
    ) -> Result<(), ImportError> {
        match_xml_events!(reader => {
            Event::Start(event) => match event.local_name().as_ref() {
                TAG_ROW => {
                    self.row = event
                        .parse_attribute_value::<usize>("r")?
                        .and_then(|row| row.checked_sub(1))
                        .unwrap_or(self.next_row);
                    self.next_row = self.row + 1;
                    self.next_column = 0;
                    if contents.start_row(self.row)?.is_break() {
                        return Ok(());
                    }
                }
                TAG_CELL => {
                    let (row, column) = event
                        .get_attribute_value("r")?
                        .and_then(|reference| reference_to_index(&reference))
                        .unwrap_or((self.row, self.next_column));
                    self.next_column = column + 1;
                    let kind = XmlCellKind::parse(event.get_attribute_value("t")?.as_deref());
                    let style = match event.get_attribute_value("s")? {
                        Some(style) if !style.is_empty() => style.trim().parse::<usize>().map_err(|error| {
                            let reference = index_to_reference(row, column);
                            ImportError::RowParseError {
                                row: row + 1,
                                message: format!("invalid style index '{style}' in cell {reference}: {error}"),
                            }
                        })?,
                        _ => 0,
                    };
                    self.cell = Some(PendingCell { row, column, kind, style, is_formula: false, value: None });
                }
                TAG_VALUE if self.cell.is_some() => {
                    self.tag = TagKind::Value;
                    self.text.clear();
                }
                TAG_FORMULA => {
                    self.tag = TagKind::Formula;
                    if let Some(cell) = &mut self.cell {
                        cell.is_formula = true;
                    }
                }
                TAG_INLINE_STRING => {
                    self.tag = TagKind::InlineString;
                    self.text.clear();
                }
                TAG_PHONETIC_TEXT if self.tag == TagKind::InlineString => self.tag = TagKind::Phonetic,
                TAG_TEXT if self.tag == TagKind::InlineString => self.tag = TagKind::InlineText,
                _ => (),
            },
            event @ (Event::Text(_) | Event::CData(_) | Event::GeneralRef(_)) if self.is_text() => {
                self.text.push_content(&event)?;
            }
            Event::End(event) => match event.local_name().as_ref() {
                TAG_VALUE if self.tag == TagKind::Value => {
                    self.tag = TagKind::None;
                    if let Some(cell) = &mut self.cell {
                        cell.value = Some(mem::take(&mut self.text));
                    }
                }
                TAG_FORMULA if self.tag == TagKind::Formula => self.tag = TagKind::None,
                TAG_PHONETIC_TEXT if self.tag == TagKind::Phonetic => self.tag = TagKind::InlineString,
                TAG_TEXT if self.tag == TagKind::InlineText => self.tag = TagKind::InlineString,
                TAG_INLINE_STRING => {
                    self.tag = TagKind::None;
                    if let Some(cell) = &mut self.cell {
                        cell.value = Some(mem::take(&mut self.text));
                    }
                }
                TAG_CELL => {
                    self.tag = TagKind::None;
                    if let Some(cell) = self.cell.take().map(|cell| self.decode(cell)).transpose()?.flatten() {
                        contents.cell(cell)?;
                    }
                }
                TAG_ROW => {
                    if contents.end_row(self.row)?.is_break() {
                        return Ok(());
                    }
                }
                _ => (),
            },
        });
        Ok(())
    }

    fn is_text(&self) -> bool {
        matches!(self.tag, TagKind::Value | TagKind::InlineText)
    }

    /// Decodes the collected text by cell type. Blank cells and unresolvable shared strings yield `None`.
    fn decode(&self, cell: PendingCell) -> Result<Option<XmlCell>, ImportError> {
        let Some(raw_value) = cell.value.filter(|value| !value.is_empty()) else {
            return Ok(None);
        };
        let reference = index_to_reference(cell.row, cell.column);
        let parse_error = |message: String| ImportError::RowParseError { row: cell.row + 1, message };

        let value = match cell.kind {
            XmlCellKind::Boolean => match raw_value.trim() {
                "1" | "true" | "TRUE" => CellValue::Boolean(true),
                "0" | "false" | "FALSE" => CellValue::Boolean(false),
                other => Err(parse_error(format!("invalid boolean '{other}' in cell {reference}")))?,
            },
            XmlCellKind::SharedString => {
                let text = raw_value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.shared_strings.get(index));
                match text {
                    Some(text) if !text.is_empty() => CellValue::Text(text.to_owned()),
                    Some(_) => return Ok(None),
                    None => {
                        diag!(self.diagnostics, Level::Warn,
                            "Skipping cell {}: shared string index '{}' cannot be resolved", reference, raw_value);
                        return Ok(None);
                    }
                }
            }
            XmlCellKind::Error | XmlCellKind::InlineString | XmlCellKind::FormulaString => {
                CellValue::Text(raw_value.to_owned())
            }
            XmlCellKind::IsoDate => match parse_iso_datetime(raw_value.trim()) {
                Some(datetime) => CellValue::DateTime(datetime),
                None => Err(parse_error(format!("invalid date '{raw_value}' in cell {reference}")))?,
            },
            XmlCellKind::Number => match raw_value.trim().parse::<f64>() {
                Ok(number) => CellValue::Number(number),
                Err(error) => Err(parse_error(format!("invalid number '{raw_value}' in cell {reference}: {error}")))?,
            },
        };

        Ok(Some(XmlCell {
            reference,
            row: cell.row,
            column: cell.column,
            kind: cell.kind,
            is_formula: cell.is_formula,
            raw_value,
            value,
            format: self.number_formats.get_or_general(cell.style),
        }))
    }
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryDiagnostics;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        cells: Vec<XmlCell>,
        stop_after: Option<usize>,
    }

    impl SheetContents for Recorder {
        fn start_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError> {
            self.events.push(format!("start {row}"));
            Ok(ControlFlow::Continue(()))
        }

        fn cell(&mut self, cell: XmlCell) -> Result<(), ImportError> {
            self.events.push(format!("cell {}", cell.reference));
            self.cells.push(cell);
            Ok(())
        }

        fn end_row(&mut self, row: usize) -> Result<ControlFlow<()>, ImportError> {
            self.events.push(format!("end {row}"));
            if self.stop_after == Some(row) {
                Ok(ControlFlow::Break(()))
            } else {
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    fn run(xml: &str, recorder: &mut Recorder, diagnostics: &dyn Diagnostics) -> Result<(), ImportError> {
        let shared_strings = vec!["Name".to_owned(), "Ann".to_owned()];
        let custom = HashMap::from([(164u16, "yyyy-mm-dd".to_owned())]);
        let number_formats = NumberFormats::new(vec![0, 164], &custom);
        let mut handler = SheetHandler::new(&shared_strings, &number_formats, diagnostics);
        let mut reader = XmlReader::new(xml.as_bytes());
        handler.run(&mut reader, recorder)
    }

    #[test]
    fn cell_types_are_decoded() -> Result<(), ImportError> {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>A&amp;B</t><rPh><t>ignored</t></rPh></is></c></row>
            <row r="2"><c r="A2" t="b"><v>1</v></c><c r="B2" s="1"><v>45321</v></c><c r="C2" t="str"><f>A1</f><v>Name</v></c>
            <c r="D2" t="e"><v>#N/A</v></c><c r="E2"/><c r="F2" t="d"><v>2024-01-30T08:00:00Z</v></c></row>
        </sheetData></worksheet>"#;
        let mut recorder = Recorder::default();
        run(xml, &mut recorder, &MemoryDiagnostics::default())?;

        assert_eq!(recorder.events, [
            "start 0", "cell A1", "cell B1", "end 0",
            "start 1", "cell A2", "cell B2", "cell C2", "cell D2", "cell F2", "end 1",
        ]);
        let cells = &recorder.cells;
        assert_eq!(cells[0].value, CellValue::Text("Name".to_owned()));
        assert_eq!(cells[1].value, CellValue::Text("A&B".to_owned()));
        assert_eq!(cells[2].value, CellValue::Boolean(true));
        assert_eq!(cells[3].value, CellValue::Number(45321.0));
        assert!(cells[3].format.is_date);
        assert!(cells[4].is_formula);
        assert_eq!(cells[4].kind, XmlCellKind::FormulaString);
        assert_eq!(cells[5].kind, XmlCellKind::Error);
        assert_eq!(cells[5].raw_value, "#N/A");
        let expected = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap().and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(cells[6].value, CellValue::DateTime(expected));
        Ok(())
    }

    #[test]
    fn missing_references_are_numbered_sequentially() -> Result<(), ImportError> {
        let xml = r#"<x:worksheet xmlns:x="urn:x"><x:sheetData>
            <x:row><x:c t="inlineStr"><x:is><x:t>a</x:t></x:is></x:c><x:c><x:v>2</x:v></x:c></x:row>
            <x:row><x:c r="C2"><x:v>3</x:v></x:c><x:c><x:v>4</x:v></x:c></x:row>
        </x:sheetData></x:worksheet>"#;
        let mut recorder = Recorder::default();
        run(xml, &mut recorder, &MemoryDiagnostics::default())?;
        let references: Vec<_> = recorder.cells.iter().map(|cell| cell.reference.as_str()).collect();
        assert_eq!(references, ["A1", "B1", "C2", "D2"]);
        Ok(())
    }

    #[test]
    fn break_stops_the_stream() -> Result<(), ImportError> {
        let xml = r#"<worksheet><sheetData><row r="1"><c><v>1</v></c></row><row r="2"><c><v>2</v></c></row></sheetData></worksheet>"#;
        let mut recorder = Recorder { stop_after: Some(0), ..Default::default() };
        run(xml, &mut recorder, &MemoryDiagnostics::default())?;
        assert_eq!(recorder.events, ["start 0", "cell A1", "end 0"]);
        Ok(())
    }

    #[test]
    fn unresolvable_shared_strings_are_skipped() -> Result<(), ImportError> {
        let xml = r#"<worksheet><sheetData><row r="3"><c r="A3" t="s"><v>7</v></c><c r="B3" t="s"><v>x</v></c></row></sheetData></worksheet>"#;
        let mut recorder = Recorder::default();
        let diagnostics = MemoryDiagnostics::default();
        run(xml, &mut recorder, &diagnostics)?;
        assert!(recorder.cells.is_empty());
        assert!(diagnostics.contains(Level::Warn, "shared string index '7'"));
        assert!(diagnostics.contains(Level::Warn, "shared string index 'x'"));
        Ok(())
    }

    #[test]
    fn bad_numbers_fail_with_the_row() {
        let xml = r#"<worksheet><sheetData><row r="4"><c r="A4"><v>12abc</v></c></row></sheetData></worksheet>"#;
        let mut recorder = Recorder::default();
        match run(xml, &mut recorder, &MemoryDiagnostics::default()) {
            Err(ImportError::RowParseError { row, message }) => {
                assert_eq!(row, 4);
                assert!(message.contains("A4"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_style_index_names_the_cell() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="C2" s="x1"><v>5</v></c></row></sheetData></worksheet>"#;
        let mut recorder = Recorder::default();
        match run(xml, &mut recorder, &MemoryDiagnostics::default()) {
            Err(ImportError::RowParseError { row, message }) => {
                assert_eq!(row, 2);
                assert!(message.contains("C2"));
                assert!(message.contains("x1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
