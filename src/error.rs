use crate::import::convert::ConversionError;
use std::fmt;
use thiserror::Error;

/// Main error type of the import engine.
/// Aggregates user-facing import failures and the low-level faults they may wrap.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("File '{path}' does not exist")]
    FileNotFound { path: String },

    #[error("Unsupported file type '{name}', only .xls, .xlsx and .csv files can be imported")]
    UnsupportedFileType { name: String },

    #[error("Invalid CSV configuration: {0}")]
    InvalidCsvFormat(String),

    #[error("Sheet '{sheet}' does not exist in the workbook")]
    SheetNotFound { sheet: String },

    #[error("No sheet has been opened")]
    SheetNotOpened,

    #[error("Row {row} does not exist in the sheet")]
    RowNotFound { row: usize },

    #[error("Invalid row index {row}")]
    InvalidRowIndex { row: i64 },

    #[error("No column information could be found in sheet: '{sheet}'")]
    EmptyHeader { sheet: String },

    #[error("Unable to find header row {row} in sheet: '{sheet}'")]
    HeaderNotFound { sheet: String, row: usize },

    #[error("Column with name: '{name}' is not found in sheet: '{sheet}'")]
    ColumnNotFound { name: String, sheet: String },

    #[error("'{column}' column does not exist in the file, please check the header row")]
    HeaderMismatch { column: String },

    #[error("Some of the columns are missing: {expected} columns expected but the file has {actual}")]
    StructuralMismatch { expected: usize, actual: usize },

    #[error("Unable to import data due to invalid formula at cell {reference} of Excel row #{row} in sheet '{sheet}'")]
    InvalidFormulaResult { reference: String, row: usize, sheet: String },

    #[error("Row {row}, column '{column}': {source}")]
    Conversion {
        row: usize,
        column: String,
        #[source]
        source: ConversionError,
    },

    #[error("Error while parsing file at row no {row}: {message}")]
    RowParseError { row: usize, message: String },

    #[error("{0}")]
    EncryptedOrCorruptDocument(DocumentIssue),

    #[error("{context}: {source}")]
    ImportFailed {
        context: String,
        #[source]
        source: Box<ImportError>,
    },

    // Standard library errors
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    // Third-party library errors
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    // Helper module errors
    #[error("{0}")]
    Cfb(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    Biff8(#[from] crate::helpers::biff8::Biff8Error),

    #[error("{0}")]
    XmlHelper(#[from] crate::helpers::xml::XmlError),

    // Spreadsheet module errors
    #[error("{0}")]
    Xls(#[from] crate::spreadsheet::xls::XlsError),
}

/// Reason a workbook container could not be opened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DocumentIssue {
    /// Neither a compound binary container nor a zip package.
    NotOfficeDocument,
    /// The container type does not match the file extension.
    LegacyContainerMismatch,
    /// The workbook is encrypted.
    PasswordProtected,
    /// A record inside the container is truncated or malformed.
    UnreadableRecord,
}

impl fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::NotOfficeDocument => "Document could not be imported because this data file is not XLS or XLSX or CSV. Please make sure the data file is valid and has the correct extension.",
            Self::LegacyContainerMismatch => "Document could not be imported. Please make sure the data file is valid and has the correct extension.",
            Self::PasswordProtected => "Document could not be imported because it is encrypted.",
            Self::UnreadableRecord => "Document could not be imported because one of its cell values is invalid or cannot be read.",
        };
        f.write_str(message)
    }
}

impl ImportError {
    /// Row (1-based) the failure is attributed to, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::RowNotFound { row }
            | Self::InvalidFormulaResult { row, .. }
            | Self::Conversion { row, .. }
            | Self::RowParseError { row, .. } => Some(*row),
            Self::HeaderNotFound { row, .. } => Some(*row),
            Self::ImportFailed { source, .. } => source.row(),
            _ => None,
        }
    }
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage<T> {
    fn with_prefix(self, message: &str) -> Result<T, ImportError>;
}

impl<T, E: Into<ImportError>> ResultMessage<T> for Result<T, E> {
    fn with_prefix(self, message: &str) -> Result<T, ImportError> {
        self.map_err(|error| ImportError::ImportFailed {
            context: message.to_owned(),
            source: Box::new(error.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_none_else_only_replaces_none() {
        let found: Result<Option<u8>, ImportError> = Ok(Some(1));
        assert_eq!(found.ok_none_else(|| Ok(Some(2))).ok().flatten(), Some(1));

        let missing: Result<Option<u8>, ImportError> = Ok(None);
        assert_eq!(missing.ok_none_else(|| Ok(Some(2))).ok().flatten(), Some(2));
    }

    #[test]
    fn with_prefix_keeps_the_cause() {
        let result: Result<(), ImportError> = Err(ImportError::RowParseError { row: 7, message: "bad quote".to_owned() });
        let error = result.with_prefix("Unable to load sheet").unwrap_err();
        assert_eq!(error.to_string(), "Unable to load sheet: Error while parsing file at row no 7: bad quote");
        assert_eq!(error.row(), Some(7));
    }

    #[test]
    fn document_issue_messages() {
        let error = ImportError::EncryptedOrCorruptDocument(DocumentIssue::PasswordProtected);
        assert_eq!(error.to_string(), "Document could not be imported because it is encrypted.");
        assert!(DocumentIssue::NotOfficeDocument.to_string().contains("not XLS or XLSX or CSV"));
    }
}
