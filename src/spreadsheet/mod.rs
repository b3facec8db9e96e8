//! Readers for `.xls`, `.xlsx` and `.csv` files and the cell model they share.
//!
//! Every reader produces header cells and data rows of [`cell::Cell`]s. The import layer sees
//! them through the [`RowSource`] trait.

pub mod cell;
pub mod csv;
pub(crate) mod excel;
pub(crate) mod handler;
pub mod number_format;
pub mod reference;
pub mod xls;
pub mod xlsx;

use crate::error::ImportError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::Row;

/// Origin of the cells, which decides the value the converter reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// Workbook cells; conversions read the formatted value
    Spreadsheet,
    /// Delimited text; conversions read the raw value
    DelimitedText,
}

/// Header and ordered data rows of one sheet or file.
pub trait RowSource {
    /// Sheet name, or the file name for delimited text
    fn sheet_name(&self) -> &str;

    fn source_format(&self) -> SourceFormat;

    fn header(&mut self) -> Result<Vec<Cell>, ImportError>;

    /// Visits the data rows in order. Only columns present in `header` are reported.
    fn for_each_row(
        &mut self,
        header: &[Cell],
        visit: &mut dyn FnMut(Row) -> Result<(), ImportError>,
    ) -> Result<(), ImportError>;
}
