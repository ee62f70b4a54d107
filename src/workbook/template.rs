//! A template workbook on its way to becoming a weekly report.
//!
//! The template archive is held as raw bytes and cell edits are collected in
//! memory. Saving copies every part of the archive unchanged except:
//!
//! - the primary worksheet, which receives the edits
//! - `xl/workbook.xml`, flagged for a full recalculation on open
//! - the calculation chain, dropped together with its references
//!
//! Other sheets, styles, merged ranges, column widths, defined names and
//! drawings therefore come through as the template had them.

use crate::error::{ReportError, Result};
use crate::workbook::package::{self, PackageError, PrimarySheet};
use crate::workbook::sheet::CellValue;
use crate::workbook::sheet_xml::{self, CellEdits};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub struct ReportWorkbook {
    bytes: Vec<u8>,
    primary: PrimarySheet,
    edits: CellEdits,
}

impl ReportWorkbook {
    /// Loads a template; fails with `TemplateOpen` if it is not a readable `.xlsx` package.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |message: String| ReportError::TemplateOpen {
            path: path.display().to_string(),
            message,
        };

        let bytes = fs::read(path).map_err(|e| open_error(e.to_string()))?;
        let mut archive =
            ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| open_error(e.to_string()))?;
        let primary = package::primary_sheet(&mut archive).map_err(|e| open_error(e.to_string()))?;
        drop(archive);

        Ok(Self {
            bytes,
            primary,
            edits: CellEdits::new(),
        })
    }

    /// Name of the worksheet that receives the edits.
    pub fn sheet_name(&self) -> &str {
        &self.primary.name
    }

    /// Queues a value for a 1-based (row, column). `CellValue::Empty` clears the cell.
    pub fn set(&mut self, row: u32, column: u32, value: CellValue) {
        if row == 0 || column == 0 {
            return;
        }
        self.edits.insert((row, column), value);
    }

    /// Pending value for a cell, if one was queued.
    pub fn edit(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.edits.get(&(row, column))
    }

    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    /// Writes the edited copy to `path`; the template file is never touched.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.write_package(path)
            .map_err(|e| ReportError::TemplateSave {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn write_package(&self, path: &Path) -> std::result::Result<(), PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut writer = ZipWriter::new(File::create(path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();

            let rewritten = if name == self.primary.part {
                sheet_xml::patch_sheet_xml(&read_entry(&mut entry)?, &self.edits)?
            } else if name == package::WORKBOOK_PART {
                package::force_full_calculation(&read_entry(&mut entry)?)?
            } else if name == package::CONTENT_TYPES_PART {
                package::without_calc_chain_override(&read_entry(&mut entry)?)?
            } else if name == package::WORKBOOK_RELS_PART {
                package::without_calc_chain_relationship(&read_entry(&mut entry)?)?
            } else if name == package::CALC_CHAIN_PART {
                continue;
            } else {
                writer.raw_copy_file(entry)?;
                continue;
            };

            writer.start_file(name, options)?;
            writer.write_all(&rewritten)?;
        }

        writer.finish()?;
        Ok(())
    }
}

fn read_entry<R: Read>(entry: &mut R) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}
