//! XLSX row reader using custom XML parsers

use anyhow::{Context, Result};

use std::fs::File;
use std::path::Path;
use zip::ZipArchive;

pub mod parser_utils;
pub mod workbook;
pub mod xlsx_parser;

use self::xlsx_parser::XlsxReader;
pub use workbook::{CellValue, RawRecord};

/// Trait for spreadsheet format readers
pub trait RowReader {
    /// Read the rows of a sheet starting at a 1-based row number
    fn read_rows(&mut self, sheet_name: &str, start_row: u32) -> Result<Vec<RawRecord>>;
}

/// Read the rows of `sheet_name` from `start_row` (1-based) onward.
///
/// Rows without any stored cell are not returned; cells are typed as text,
/// number, boolean or datetime (numbers whose format is a date format).
pub fn read_rows<P: AsRef<Path>>(path: P, sheet_name: &str, start_row: u32) -> Result<Vec<RawRecord>> {
    let path_ref = path.as_ref();

    let is_xlsx = path_ref
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false);
    if !is_xlsx {
        return Err(anyhow::anyhow!(
            "Unsupported file format: {}",
            path_ref.display()
        ));
    }

    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
    let mut archive = ZipArchive::new(file).context("Failed to open zip archive")?;

    let mut reader = XlsxReader::new(&mut archive)?;
    reader
        .read_rows(sheet_name, start_row)
        .with_context(|| format!("Failed to read sheet '{}'", sheet_name))
}
