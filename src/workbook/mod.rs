pub mod cell_copier;
pub mod package;
pub mod sheet;
pub mod sheet_xml;
pub mod template;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cell_copier::CellRangeCopier;
pub use sheet::{CellValue, SourceSheet};
pub use template::ReportWorkbook;
