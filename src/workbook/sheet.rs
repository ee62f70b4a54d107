//! Cell values and read access to source workbooks.
//!
//! Sources are read with `calamine`, which yields cached values only. The
//! sheet read is the one the workbook opens on (its active tab), falling
//! back to the first sheet for formats without that information.

use crate::error::{ReportError, Result};
use crate::workbook::package;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use zip::ZipArchive;

/// Type-agnostic cell content.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date number.
    DateTime(f64),
    /// Error literal such as `#DIV/0!`.
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(n) => CellValue::Number(*n as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::Error(e) => CellValue::Error(e.to_string()),
            Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) => CellValue::Text(s.clone()),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }
}

/// Cached values of the primary sheet of a workbook.
///
/// The underlying file is closed as soon as `open` returns.
pub struct SourceSheet {
    name: String,
    values: Range<Data>,
}

impl SourceSheet {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let read_error = |message: String| ReportError::SourceRead {
            path: path.display().to_string(),
            message,
        };

        let active = active_sheet_name(path);
        let mut workbook = open_workbook_auto(path).map_err(|e| read_error(e.to_string()))?;
        let names = workbook.sheet_names();
        let name = active
            .filter(|name| names.contains(name))
            .or_else(|| names.first().cloned())
            .ok_or_else(|| read_error("workbook has no sheets".to_string()))?;

        let values = workbook
            .worksheet_range(&name)
            .map_err(|e| read_error(e.to_string()))?;

        Ok(Self { name, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value at a 1-based (row, column); cells outside the used range are empty.
    pub fn value(&self, row: u32, column: u32) -> CellValue {
        if row == 0 || column == 0 {
            return CellValue::Empty;
        }

        self.values
            .get_value((row - 1, column - 1))
            .map(CellValue::from)
            .unwrap_or(CellValue::Empty)
    }
}

/// Active tab of an `.xlsx` package; `None` for other formats.
fn active_sheet_name(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut archive = ZipArchive::new(BufReader::new(file)).ok()?;
    package::primary_sheet(&mut archive).ok().map(|sheet| sheet.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::fixtures::write_workbook;
    use rust_xlsxwriter::Workbook;
    use tempfile::TempDir;

    #[test]
    fn test_reads_values_and_empty_outside_range() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("source.xlsx");
        write_workbook(
            &path,
            &[
                (1, 1, CellValue::Text("Station".to_string())),
                (3, 3, CellValue::Number(7.0)),
                (6, 4, CellValue::Bool(true)),
            ],
        );

        let source = SourceSheet::open(&path).unwrap();
        assert_eq!(source.value(1, 1), CellValue::Text("Station".to_string()));
        assert_eq!(source.value(3, 3), CellValue::Number(7.0));
        assert_eq!(source.value(6, 4), CellValue::Bool(true));
        assert_eq!(source.value(27, 3), CellValue::Empty);
        assert_eq!(source.value(0, 3), CellValue::Empty);
    }

    #[test]
    fn test_reads_the_active_sheet() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("source.xlsx");

        let mut workbook = Workbook::new();
        let cover = workbook.add_worksheet();
        cover.set_name("Cover").unwrap();
        cover.write_number(2, 2, 1.0).unwrap();
        let data = workbook.add_worksheet();
        data.set_name("Data").unwrap();
        data.write_number(2, 2, 2.0).unwrap();
        data.set_active(true);
        workbook.save(&path).unwrap();

        let source = SourceSheet::open(&path).unwrap();
        assert_eq!(source.name(), "Data");
        assert_eq!(source.value(3, 3), CellValue::Number(2.0));
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        assert!(matches!(
            SourceSheet::open(&path),
            Err(ReportError::SourceRead { .. })
        ));
    }

    #[test]
    fn test_data_conversion() {
        assert_eq!(CellValue::from(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(
            CellValue::from(&Data::String("x".to_string())),
            CellValue::Text("x".to_string())
        );
        assert_eq!(
            CellValue::from(&Data::Error(calamine::CellErrorType::Div0)),
            CellValue::Error("#DIV/0!".to_string())
        );
        assert!(CellValue::from(&Data::Empty).is_empty());
    }
}
