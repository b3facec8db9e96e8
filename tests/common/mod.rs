use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Writes `content` to `name` inside `directory`.
pub fn write_file(directory: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = directory.path().join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

/// Single-sheet `.xlsx` package. Style 1 is the built-in `m/d/yy` date format.
pub fn xlsx(path: &Path, sheet_name: &str, rows: &str, is_1904: bool) {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_owned(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_owned(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr date1904="{}"/><sheets><sheet name="{sheet_name}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                u8::from(is_1904)
            ),
        ),
        (
            "xl/styles.xml",
            r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#.to_owned(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#),
        ),
    ];
    for (name, content) in parts {
        writer.start_file(name, SimpleFileOptions::default()).expect("start part");
        writer.write_all(content.as_bytes()).expect("write part");
    }
    let bytes = writer.finish().expect("finish package").into_inner();
    std::fs::write(path, bytes).expect("write package");
}

/// Inline string cell.
pub fn text(reference: &str, value: &str) -> String {
    format!(r#"<c r="{reference}" t="inlineStr"><is><t>{value}</t></is></c>"#)
}

pub fn number(reference: &str, value: &str, style: u8) -> String {
    format!(r#"<c r="{reference}" s="{style}"><v>{value}</v></c>"#)
}

/// Cell of a `.xls` fixture: inline text, or a number with a style (1 is `m/d/yy`).
pub enum XlsCell<'a> {
    Text(&'a str),
    Number(f64, u16),
}

fn biff_record(kind: u16, body: &[u8]) -> Vec<u8> {
    let mut bytes = kind.to_le_bytes().to_vec();
    bytes.extend((body.len() as u16).to_le_bytes());
    bytes.extend(body);
    bytes
}

fn biff_string(text: &str) -> Vec<u8> {
    let mut bytes = (text.encode_utf16().count() as u16).to_le_bytes().to_vec();
    bytes.push(1);
    bytes.extend(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

fn biff_globals(sheet_name: &str, sheet_offset: u32) -> Vec<u8> {
    let mut stream = biff_record(0x0809, &[0x00, 0x06, 0x05, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    stream.extend(biff_record(0x0042, &1200u16.to_le_bytes()));
    stream.extend(biff_record(0x0022, &0u16.to_le_bytes()));
    for format_id in [0u16, 14] {
        let mut body = 0u16.to_le_bytes().to_vec();
        body.extend(format_id.to_le_bytes());
        body.resize(20, 0);
        stream.extend(biff_record(0x00E0, &body));
    }
    let mut body = sheet_offset.to_le_bytes().to_vec();
    body.extend([0, 0]);
    body.push(sheet_name.encode_utf16().count() as u8);
    body.push(1);
    body.extend(sheet_name.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    stream.extend(biff_record(0x0085, &body));
    stream.extend(biff_record(0x000A, &[]));
    stream
}

/// Single-sheet BIFF8 workbook in a version 3 compound file.
pub fn xls(path: &Path, sheet_name: &str, rows: &[Vec<XlsCell>]) {
    let mut sheet = biff_record(0x0809, &[0x00, 0x06, 0x10, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    for (row, cells) in rows.iter().enumerate() {
        for (column, cell) in cells.iter().enumerate() {
            let (kind, style, value) = match cell {
                XlsCell::Text(text) => (0x0204, 0u16, biff_string(text)),
                XlsCell::Number(number, style) => (0x0203, *style, number.to_le_bytes().to_vec()),
            };
            let mut body = [(row as u16).to_le_bytes(), (column as u16).to_le_bytes(), style.to_le_bytes()].concat();
            body.extend(value);
            sheet.extend(biff_record(kind, &body));
        }
    }
    sheet.extend(biff_record(0x000A, &[]));

    let offset = biff_globals(sheet_name, 0).len() as u32;
    let mut stream = biff_globals(sheet_name, offset);
    stream.extend(sheet);
    std::fs::write(path, compound_file("Workbook", stream)).expect("write workbook");
}

fn directory_entry(name: &str, kind: u8, start: u32, size: u64) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let encoded: Vec<u8> = name
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    entry[..encoded.len()].copy_from_slice(&encoded);
    entry[64..66].copy_from_slice(&(encoded.len() as u16).to_le_bytes());
    entry[66] = kind;
    for range in [68..72, 72..76, 76..80] {
        entry[range].copy_from_slice(&u32::MAX.to_le_bytes());
    }
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&size.to_le_bytes());
    entry
}

/// One stream in regular 512-byte sectors: FAT at sector 0, directory at 1, stream from 2.
fn compound_file(stream_name: &str, mut stream: Vec<u8>) -> Vec<u8> {
    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FREE_SECT: u32 = 0xFFFF_FFFF;
    const CUTOFF: usize = 4096;
    if stream.len() < CUTOFF {
        stream.resize(CUTOFF, 0);
    }
    let stream_sectors = stream.len().div_ceil(512);

    let mut header = vec![0u8; 512];
    header[0..8].copy_from_slice(&0xE11A_B1A1_E011_CFD0u64.to_le_bytes());
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&1u32.to_le_bytes());
    header[48..52].copy_from_slice(&1u32.to_le_bytes());
    header[56..60].copy_from_slice(&(CUTOFF as u32).to_le_bytes());
    header[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[76..80].copy_from_slice(&0u32.to_le_bytes());
    for slot in header[80..512].chunks_exact_mut(4) {
        slot.copy_from_slice(&FREE_SECT.to_le_bytes());
    }

    let mut fat: Vec<u32> = vec![0xFFFF_FFFD, END_OF_CHAIN];
    for sector in 0..stream_sectors {
        fat.push(if sector + 1 == stream_sectors { END_OF_CHAIN } else { (sector + 3) as u32 });
    }
    fat.resize(128, FREE_SECT);

    let mut directory = directory_entry("Root Entry", 5, END_OF_CHAIN, 0);
    directory.extend(directory_entry(stream_name, 2, 2, stream.len() as u64));
    directory.resize(512, 0);

    let mut file = header;
    file.extend(fat.iter().flat_map(|value| value.to_le_bytes()));
    file.extend(directory);
    stream.resize(stream_sectors * 512, 0);
    file.extend(stream);
    file
}
