//! # Sheet Import
//!
//! Reads tabular data from spreadsheet and delimited-text files and turns every data row into a
//! typed record.
//!
//! ## Features
//!
//! - **Multi-format support**: legacy binary workbooks (`.xls`), XML workbooks (`.xlsx`) and
//!   delimited text (`.csv`), chosen by file extension
//! - **Typed conversion**: string, integer, long, exact decimal, boolean and date-time targets
//! - **Date detection**: serial numbers formatted with a date pattern become date-times, honoring
//!   the workbook's 1900 or 1904 epoch
//! - **Streaming**: `.xlsx` sheets are parsed as an event stream, never materialised as a DOM
//! - **Header validation**: every mapped column must be present before any row is converted
//! - **Pure Rust implementation**: compound files and BIFF8 records are decoded in-crate
//!
//! ## Usage
//!
//! ```no_run
//! use sheet_import::{ColumnMapping, ImportSettings, Importer, SheetSettings, TargetKind};
//!
//! let mappings = [
//!     ColumnMapping::new("Person", "name", "Name", TargetKind::String),
//!     ColumnMapping::new("Person", "age", "Age", TargetKind::Integer),
//! ];
//! let settings = ImportSettings::Sheet(SheetSettings::new("People"));
//! let records = Importer::default().import("people.xlsx", &settings, &mappings)?;
//! # Ok::<(), sheet_import::ImportError>(())
//! ```

pub mod diagnostics;
pub mod error;
mod helpers;
pub mod import;
pub mod settings;
pub mod spreadsheet;

pub use crate::diagnostics::Diagnostics;
pub use crate::diagnostics::LogDiagnostics;
pub use crate::diagnostics::NoDiagnostics;
pub use crate::error::DocumentIssue;
pub use crate::error::ImportError;
pub use crate::import::convert::ConversionError;
pub use crate::import::convert::Value;
pub use crate::import::mapping::ColumnMapping;
pub use crate::import::mapping::JsonMappingElement;
pub use crate::import::mapping::TargetKind;
pub use crate::import::record::records_to_json;
pub use crate::import::record::Record;
pub use crate::import::Importer;
pub use crate::settings::CsvSettings;
pub use crate::settings::ImportSettings;
pub use crate::settings::SheetSettings;
