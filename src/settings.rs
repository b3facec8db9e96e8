//! Caller-supplied import options.

use serde::Deserialize;

/// Where the header and the data start inside a workbook sheet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SheetSettings {
    pub sheet_name: String,
    /// 1-based row holding the column names
    pub header_row: usize,
    /// 1-based row of the first data row
    pub data_row: usize,
}

impl Default for SheetSettings {
    fn default() -> Self {
        SheetSettings {
            sheet_name: "Sheet1".to_owned(),
            header_row: 1,
            data_row: 2,
        }
    }
}

impl SheetSettings {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        SheetSettings {
            sheet_name: sheet_name.into(),
            ..Default::default()
        }
    }
}

/// Dialect of a delimited text file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CsvSettings {
    pub delimiter: char,
    pub quote: Option<char>,
    pub escape: Option<char>,
    /// The first record names the columns and is imported as row 1 as well
    pub header_is_data: bool,
}

impl Default for CsvSettings {
    fn default() -> Self {
        CsvSettings {
            delimiter: ',',
            quote: Some('"'),
            escape: Some('"'),
            header_is_data: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSettings {
    Sheet(SheetSettings),
    Csv(CsvSettings),
}

impl ImportSettings {
    pub(crate) fn sheet(&self) -> SheetSettings {
        match self {
            Self::Sheet(settings) => settings.clone(),
            Self::Csv(_) => SheetSettings::default(),
        }
    }

    pub(crate) fn csv(&self) -> CsvSettings {
        match self {
            Self::Csv(settings) => settings.clone(),
            Self::Sheet(_) => CsvSettings::default(),
        }
    }
}
