//! Workbook builders shared by unit tests.

use crate::workbook::CellValue;
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Writes a single-sheet workbook holding `cells` at 1-based coordinates.
pub(crate) fn write_workbook(path: &Path, cells: &[(u32, u32, CellValue)]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (row, column, value) in cells {
        let (row, column) = (row - 1, (column - 1) as u16);
        match value {
            CellValue::Empty => {}
            CellValue::Text(s) | CellValue::Error(s) => {
                worksheet.write_string(row, column, s).unwrap();
            }
            CellValue::Number(n) | CellValue::DateTime(n) => {
                worksheet.write_number(row, column, *n).unwrap();
            }
            CellValue::Bool(b) => {
                worksheet.write_boolean(row, column, *b).unwrap();
            }
        }
    }

    workbook.save(path).unwrap();
}
