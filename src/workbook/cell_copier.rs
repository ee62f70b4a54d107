use crate::config::LayoutConfig;
use crate::error::{ReportError, Result};
use crate::workbook::sheet::SourceSheet;
use crate::workbook::template::ReportWorkbook;
use crate::report::DAYS_PER_WEEK;
use std::path::Path;
use tracing::debug;

/// Copies one day's column of values from a source workbook into a report.
#[derive(Debug, Clone, Copy)]
pub struct CellRangeCopier {
    layout: LayoutConfig,
}

impl CellRangeCopier {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    /// 1-based destination column for a day of the week window.
    pub fn destination_column(&self, day_index: usize) -> u32 {
        self.layout.first_destination_column + day_index as u32
    }

    /// Returns the number of cells written, empty ones included.
    pub fn copy_day<P: AsRef<Path>>(
        &self,
        source: P,
        destination: &mut ReportWorkbook,
        day_index: usize,
    ) -> Result<usize> {
        let source = source.as_ref();

        if day_index >= DAYS_PER_WEEK {
            return Err(ReportError::Validation {
                message: format!("day index {} is outside the week window", day_index),
            });
        }

        let source_sheet = SourceSheet::open(source)?;
        let column = self.destination_column(day_index);

        for row in self.layout.first_source_row..=self.layout.last_source_row {
            let value = source_sheet.value(row, self.layout.source_column);
            destination.set(row + self.layout.destination_row_offset, column, value);
        }
        let copied = self.layout.rows_per_day() as usize;

        debug!(
            source = %source.display(),
            day = day_index,
            cells = copied,
            "copied day column"
        );
        Ok(copied)
    }
}
