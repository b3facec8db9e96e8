//! Microsoft Office Excel Helpers
use crate::error::DocumentIssue;
use crate::error::ImportError;
use crate::helpers::cfb::has_signature;
use crate::helpers::cfb::Cfb;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::number_format::DateEpoch;
use crate::spreadsheet::number_format::NumberFormat;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const ENCRYPTED_PACKAGE: &str = "EncryptedPackage";

/// Opens a zip package, classifying anything else as an unusable document.
pub(crate) fn open_package(path: &Path) -> Result<ZipArchive<BufReader<File>>, ImportError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut signature = Vec::with_capacity(8);
    reader.by_ref().take(8).read_to_end(&mut signature)?;
    reader.rewind()?;

    if has_signature(&signature) {
        // Encrypted OOXML packages are wrapped in a compound file
        let issue = match Cfb::new(&mut reader) {
            Ok(cfb) if cfb.exists(ENCRYPTED_PACKAGE) => DocumentIssue::PasswordProtected,
            _ => DocumentIssue::LegacyContainerMismatch,
        };
        Err(ImportError::EncryptedOrCorruptDocument(issue))?
    }
    ZipArchive::new(reader).map_err(|_| ImportError::EncryptedOrCorruptDocument(DocumentIssue::NotOfficeDocument))
}

/// Parses a legacy compound file, classifying everything else as an unusable document.
pub(crate) fn open_compound_file(bytes: Vec<u8>) -> Result<Cfb, ImportError> {
    if !has_signature(&bytes) {
        let issue = if bytes.starts_with(ZIP_SIGNATURE) {
            DocumentIssue::LegacyContainerMismatch
        } else {
            DocumentIssue::NotOfficeDocument
        };
        Err(ImportError::EncryptedOrCorruptDocument(issue))?
    }
    let cfb = Cfb::from_bytes(bytes).map_err(unreadable)?;
    if cfb.exists(ENCRYPTED_PACKAGE) {
        Err(ImportError::EncryptedOrCorruptDocument(DocumentIssue::PasswordProtected))?
    }
    Ok(cfb)
}

/// Reports structural faults of a binary workbook as an unreadable document.
pub(crate) fn unreadable(error: ImportError) -> ImportError {
    match error {
        ImportError::Cfb(_) | ImportError::Biff8(_) | ImportError::Xls(_) => {
            ImportError::EncryptedOrCorruptDocument(DocumentIssue::UnreadableRecord)
        }
        error => error,
    }
}

/// Loads worksheet relationships: relationship id -> part path inside the package.
pub(crate) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, ImportError> {
    let mut relationships: HashMap<String, String> = HashMap::new();
    let Some(mut reader) = zip.xml_reader(path)? else {
        return Ok(relationships);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target to a path inside the package.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(path) = path.strip_prefix('/') {
        path.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

/// Numeric cell, promoted to a date-time when its number format is a date pattern.
pub(crate) fn number_cell(
    column_index: usize,
    column_header: String,
    value: f64,
    format: &NumberFormat,
    epoch: DateEpoch,
) -> Cell {
    let raw_value = Some(CellValue::Number(value));
    let datetime = format.is_date.then(|| epoch.to_datetime(value)).flatten();
    match datetime {
        Some(datetime) => Cell {
            column_index,
            column_header,
            raw_value,
            formatted_value: Some(CellValue::DateTime(datetime)),
            display_mask: Some(format.code.to_owned()),
            numeric_format_code: format.id,
        },
        None => Cell {
            column_index,
            column_header,
            formatted_value: raw_value.clone(),
            raw_value,
            display_mask: None,
            numeric_format_code: format.id,
        },
    }
}
