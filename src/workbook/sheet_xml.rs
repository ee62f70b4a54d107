//! In-place edits of a worksheet part.
//!
//! The part is streamed event by event. Rows and cells without an edit are
//! written back untouched, so merged ranges, column widths, conditional
//! formats and the rest of the part survive. An edited cell keeps its style
//! index and only its value changes.

use crate::workbook::package::{
    attribute_raw, prefix_of, with_attribute, without_attribute, write_event, PackageError,
};
use crate::workbook::sheet::CellValue;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

/// Pending cell values keyed by 1-based (row, column).
pub type CellEdits = BTreeMap<(u32, u32), CellValue>;

type RowEdits<'a> = BTreeMap<u32, &'a CellValue>;

/// A1-style reference for a 1-based (row, column).
pub fn cell_reference(row: u32, column: u32) -> String {
    let mut letters = Vec::new();
    let mut remaining = column;
    while remaining > 0 {
        letters.push(b'A' + ((remaining - 1) % 26) as u8);
        remaining = (remaining - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row)
}

/// Parses an A1-style reference into a 1-based (row, column).
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let digits_at = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(digits_at);
    if letters.is_empty() {
        return None;
    }

    let mut column: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let value = u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1;
        column = column.checked_mul(26)?.checked_add(value)?;
    }

    let row = digits.parse().ok()?;
    Some((row, column))
}

/// Applies `edits` to the worksheet XML in `xml`.
///
/// `CellValue::Empty` clears a cell: a styled cell stays behind without a
/// value, an unstyled one is removed.
pub fn patch_sheet_xml(xml: &[u8], edits: &CellEdits) -> Result<Vec<u8>, PackageError> {
    let mut rows: BTreeMap<u32, RowEdits<'_>> = BTreeMap::new();
    for (&(row, column), value) in edits {
        rows.entry(row).or_default().insert(column, value);
    }

    let mut patcher = SheetPatcher {
        writer: Writer::new(Vec::with_capacity(xml.len() + edits.len() * 32)),
        rows,
        prefix: String::new(),
    };

    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    let mut current_row: Option<(u32, RowEdits<'_>)> = None;
    let mut last_row = 0;
    let mut last_column = 0;
    // Depth inside a replaced cell whose old content is being dropped
    let mut skipping: Option<usize> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        if let Event::Eof = event {
            break;
        }

        if let Some(depth) = skipping {
            skipping = match &event {
                Event::Start(_) => Some(depth + 1),
                Event::End(_) if depth == 0 => None,
                Event::End(_) => Some(depth - 1),
                _ => Some(depth),
            };
            continue;
        }

        match &event {
            Event::Start(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                patcher.prefix = prefix_of(e.name().as_ref());
                in_sheet_data = true;
                patcher.write(event.clone())?;
            }
            Event::Empty(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                patcher.prefix = prefix_of(e.name().as_ref());
                patcher.write(Event::Start(e.to_owned()))?;
                patcher.flush_rows(None)?;
                patcher.write(Event::End(BytesEnd::new(patcher.name("sheetData"))))?;
            }
            Event::End(e)
                if in_sheet_data
                    && current_row.is_none()
                    && e.local_name().as_ref() == b"sheetData" =>
            {
                patcher.flush_rows(None)?;
                patcher.write(event.clone())?;
                in_sheet_data = false;
            }
            Event::Start(e) | Event::Empty(e)
                if in_sheet_data && current_row.is_none() && e.local_name().as_ref() == b"row" =>
            {
                let row = attribute_raw(e, b"r")
                    .and_then(|r| String::from_utf8(r).ok())
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(last_row + 1);
                patcher.flush_rows(Some(row))?;

                let cells = patcher.rows.remove(&row).unwrap_or_default();
                let changed = cells.values().any(|value| !value.is_empty());
                // `spans` is a layout hint that new cells would contradict
                let start = if changed {
                    without_attribute(e, b"spans")
                } else {
                    e.to_owned()
                };

                if matches!(event, Event::Start(_)) {
                    patcher.write(Event::Start(start))?;
                    current_row = Some((row, cells));
                    last_column = 0;
                } else if changed {
                    patcher.write(Event::Start(start))?;
                    patcher.write_cells(row, cells)?;
                    patcher.write(Event::End(BytesEnd::new(patcher.name("row"))))?;
                } else {
                    patcher.write(event.clone())?;
                }
                last_row = row;
            }
            Event::End(e) if e.local_name().as_ref() == b"row" && current_row.is_some() => {
                if let Some((row, cells)) = current_row.take() {
                    patcher.write_cells(row, cells)?;
                }
                patcher.write(event.clone())?;
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let Some((row, cells)) = current_row.as_mut() else {
                    patcher.write(event.clone())?;
                    continue;
                };
                let row = *row;

                let column = attribute_raw(e, b"r")
                    .and_then(|r| String::from_utf8(r).ok())
                    .and_then(|r| parse_cell_reference(&r))
                    .map(|(_, column)| column)
                    .unwrap_or(last_column + 1);

                let before: Vec<u32> = cells.range(..column).map(|(&c, _)| c).collect();
                for earlier in before {
                    if let Some(value) = cells.remove(&earlier) {
                        patcher.write_cell(row, earlier, None, value)?;
                    }
                }

                match cells.remove(&column) {
                    Some(value) => {
                        let style = attribute_raw(e, b"s");
                        patcher.write_cell(row, column, style.as_deref(), value)?;
                        if matches!(event, Event::Start(_)) {
                            skipping = Some(0);
                        }
                    }
                    None => patcher.write(event.clone())?,
                }
                last_column = column;
            }
            _ => patcher.write(event.clone())?,
        }
    }

    if !patcher.rows.is_empty() {
        return Err(PackageError::Malformed(
            "worksheet has no cell data section".to_string(),
        ));
    }

    Ok(patcher.writer.into_inner())
}

struct SheetPatcher<'a> {
    writer: Writer<Vec<u8>>,
    /// Edits for rows not reached yet.
    rows: BTreeMap<u32, RowEdits<'a>>,
    /// Namespace prefix used by the part, e.g. `x:`.
    prefix: String,
}

impl<'a> SheetPatcher<'a> {
    fn name(&self, local: &str) -> String {
        format!("{}{}", self.prefix, local)
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), PackageError> {
        write_event(&mut self.writer, event)
    }

    /// Writes the pending rows numbered below `limit`, or all of them.
    fn flush_rows(&mut self, limit: Option<u32>) -> Result<(), PackageError> {
        let due: Vec<u32> = self
            .rows
            .keys()
            .copied()
            .take_while(|&row| limit.map_or(true, |limit| row < limit))
            .collect();

        for row in due {
            let Some(cells) = self.rows.remove(&row) else {
                continue;
            };
            if cells.values().all(|value| value.is_empty()) {
                continue;
            }

            let mut start = BytesStart::new(self.name("row"));
            start.push_attribute(("r", row.to_string().as_str()));
            self.write(Event::Start(start))?;
            self.write_cells(row, cells)?;
            self.write(Event::End(BytesEnd::new(self.name("row"))))?;
        }
        Ok(())
    }

    fn write_cells(&mut self, row: u32, cells: RowEdits<'_>) -> Result<(), PackageError> {
        for (column, value) in cells {
            self.write_cell(row, column, None, value)?;
        }
        Ok(())
    }

    fn write_cell(
        &mut self,
        row: u32,
        column: u32,
        style: Option<&[u8]>,
        value: &CellValue,
    ) -> Result<(), PackageError> {
        let cell_name = self.name("c");
        let reference = cell_reference(row, column);
        let mut start = BytesStart::new(cell_name.clone());
        start.push_attribute(("r", reference.as_str()));
        if let Some(style) = style {
            start.push_attribute((b"s".as_slice(), style));
        }

        let (kind, content) = match value {
            CellValue::Empty => {
                if style.is_some() {
                    self.write(Event::Empty(start))?;
                }
                return Ok(());
            }
            CellValue::Text(text) => {
                let start = with_attribute(&start, b"t", b"inlineStr");
                self.write(Event::Start(start))?;
                self.write(Event::Start(BytesStart::new(self.name("is"))))?;
                let text_start = BytesStart::new(self.name("t"));
                self.write(Event::Start(with_attribute(&text_start, b"xml:space", b"preserve")))?;
                self.write(Event::Text(BytesText::new(text)))?;
                self.write(Event::End(BytesEnd::new(self.name("t"))))?;
                self.write(Event::End(BytesEnd::new(self.name("is"))))?;
                self.write(Event::End(BytesEnd::new(cell_name)))?;
                return Ok(());
            }
            CellValue::Number(n) | CellValue::DateTime(n) => (None, n.to_string()),
            CellValue::Bool(b) => (Some("b"), if *b { "1" } else { "0" }.to_string()),
            CellValue::Error(code) => (Some("e"), code.clone()),
        };

        if let Some(kind) = kind {
            start.push_attribute(("t", kind));
        }
        self.write(Event::Start(start))?;
        self.write(Event::Start(BytesStart::new(self.name("v"))))?;
        self.write(Event::Text(BytesText::new(&content)))?;
        self.write(Event::End(BytesEnd::new(self.name("v"))))?;
        self.write(Event::End(BytesEnd::new(cell_name)))?;
        Ok(())
    }
}
