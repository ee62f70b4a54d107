//! Spreadsheet package plumbing.
//!
//! An `.xlsx` file is a zip archive of XML parts. Reports are produced by
//! copying the template archive and rewriting a handful of parts, so these
//! helpers locate the primary worksheet and edit the workbook-level parts
//! that keep formulas consistent after cell values change.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::{Read, Seek};
use thiserror::Error;
use zip::ZipArchive;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Elements that follow `calcPr` inside `workbook`, in schema order.
const AFTER_CALC_PR: [&[u8]; 9] = [
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot write XML: {0}")]
    Write(String),

    #[error("workbook part {0} is missing")]
    MissingPart(String),

    #[error("{0}")]
    Malformed(String),
}

/// The worksheet a spreadsheet program shows when the file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySheet {
    pub name: String,
    /// Archive path of the worksheet part, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
}

pub fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, PackageError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| PackageError::MissingPart(name.to_string()))?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Resolves the active tab of the workbook, falling back to the first worksheet.
pub fn primary_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<PrimarySheet, PackageError> {
    let workbook = read_part(archive, WORKBOOK_PART)?;
    let relationships = read_part(archive, WORKBOOK_RELS_PART)?;

    let (sheets, active_tab) = parse_workbook(&workbook)?;
    let targets = parse_relationships(&relationships)?;

    // Chart sheets share the tab list but carry no cells
    let worksheet = |(name, rel_id): &(String, String)| {
        let part = part_path(targets.get(rel_id)?);
        part.starts_with("xl/worksheets/").then(|| PrimarySheet {
            name: name.clone(),
            part,
        })
    };

    let primary = sheets
        .get(active_tab)
        .and_then(worksheet)
        .or_else(|| sheets.iter().find_map(worksheet))
        .ok_or_else(|| PackageError::Malformed("workbook has no worksheets".to_string()))?;

    if !archive.file_names().any(|name| name == primary.part) {
        return Err(PackageError::MissingPart(primary.part));
    }
    Ok(primary)
}

/// Sheet (name, relationship id) pairs in tab order, plus the active tab index.
fn parse_workbook(xml: &[u8]) -> Result<(Vec<(String, String)>, usize), PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut active_tab = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attribute_text(&e, b"name");
                    // `r:id`, whatever the relationship prefix is called
                    let rel_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"id")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    if let (Some(name), Some(rel_id)) = (name, rel_id) {
                        sheets.push((name, rel_id));
                    }
                }
                b"workbookView" => {
                    if let Some(tab) = attribute_text(&e, b"activeTab").and_then(|v| v.parse().ok())
                    {
                        active_tab = tab;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, active_tab))
}

fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attribute_text(&e, b"Id"), attribute_text(&e, b"Target"))
                {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Relationship targets are relative to `xl/` unless they start with `/`.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// Marks the workbook for a full recalculation when it is next opened.
///
/// Cached formula results in the template were computed from the template's
/// own values and are stale once day columns are filled in.
pub fn force_full_calculation(xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 64));
    let mut buf = Vec::new();
    let mut calc_pr_written = false;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                write_event(&mut writer, Event::Start(with_attribute(e, b"fullCalcOnLoad", b"1")))?;
                calc_pr_written = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                write_event(&mut writer, Event::Empty(with_attribute(e, b"fullCalcOnLoad", b"1")))?;
                calc_pr_written = true;
            }
            Event::Start(e) | Event::Empty(e)
                if !calc_pr_written
                    && AFTER_CALC_PR
                        .iter()
                        .any(|name| *name == e.local_name().as_ref()) =>
            {
                write_event(&mut writer, Event::Empty(calc_pr(e.name().as_ref())))?;
                calc_pr_written = true;
                write_event(&mut writer, event.clone())?;
            }
            Event::End(e) if !calc_pr_written && e.local_name().as_ref() == b"workbook" => {
                write_event(&mut writer, Event::Empty(calc_pr(e.name().as_ref())))?;
                calc_pr_written = true;
                write_event(&mut writer, event.clone())?;
            }
            _ => write_event(&mut writer, event.clone())?,
        }
    }

    Ok(writer.into_inner())
}

/// Drops the `[Content_Types].xml` override registering the calculation chain.
pub fn without_calc_chain_override(xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    drop_elements(xml, |e| {
        e.local_name().as_ref() == b"Override"
            && attribute_text(e, b"PartName").as_deref() == Some("/xl/calcChain.xml")
    })
}

/// Drops the workbook relationship pointing at the calculation chain.
pub fn without_calc_chain_relationship(xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    drop_elements(xml, |e| {
        e.local_name().as_ref() == b"Relationship"
            && attribute_text(e, b"Target").is_some_and(|t| t.ends_with("calcChain.xml"))
    })
}

/// Copies `xml`, leaving out every element (and its children) matching `drop`.
fn drop_elements<F>(xml: &[u8], drop: F) -> Result<Vec<u8>, PackageError>
where
    F: Fn(&BytesStart<'_>) -> bool,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth: Option<usize> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        if let Event::Eof = event {
            break;
        }

        if let Some(depth) = skip_depth {
            skip_depth = match &event {
                Event::Start(_) => Some(depth + 1),
                Event::End(_) if depth == 0 => None,
                Event::End(_) => Some(depth - 1),
                _ => Some(depth),
            };
        } else {
            match &event {
                Event::Start(e) if drop(e) => skip_depth = Some(0),
                Event::Empty(e) if drop(e) => {}
                _ => write_event(&mut writer, event.clone())?,
            }
        }
    }

    Ok(writer.into_inner())
}

pub(crate) fn write_event(
    writer: &mut Writer<Vec<u8>>,
    event: Event<'_>,
) -> Result<(), PackageError> {
    writer
        .write_event(event)
        .map_err(|e| PackageError::Write(e.to_string()))
}

/// Unescaped value of the attribute named exactly `key`.
pub(crate) fn attribute_text(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Raw (still escaped) value of the attribute named exactly `key`.
pub(crate) fn attribute_raw(e: &BytesStart<'_>, key: &[u8]) -> Option<Vec<u8>> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| a.value.into_owned())
}

/// Copy of `e` with `key` set to `value`, replacing any previous value.
pub(crate) fn with_attribute(e: &BytesStart<'_>, key: &[u8], value: &[u8]) -> BytesStart<'static> {
    let mut element = without_attribute(e, key);
    element.push_attribute((key, value));
    element
}

/// Copy of `e` without the attribute `key`.
pub(crate) fn without_attribute(e: &BytesStart<'_>, key: &[u8]) -> BytesStart<'static> {
    let mut element = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != key {
            element.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    element
}

/// Namespace prefix of a qualified element name, including the colon.
pub(crate) fn prefix_of(qualified_name: &[u8]) -> String {
    match qualified_name.iter().position(|&b| b == b':') {
        Some(colon) => String::from_utf8_lossy(&qualified_name[..=colon]).into_owned(),
        None => String::new(),
    }
}

fn calc_pr(sibling_name: &[u8]) -> BytesStart<'static> {
    let mut element = BytesStart::new(format!("{}calcPr", prefix_of(sibling_name)));
    element.push_attribute(("fullCalcOnLoad", "1"));
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView activeTab="1"/></bookViews><sheets><sheet name="Notes" sheetId="1" r:id="rId1"/><sheet name="R&amp;D" sheetId="2" r:id="rId2"/><sheet name="Chart" sheetId="3" r:id="rId3"/></sheets><definedNames><definedName name="Total">'R&amp;D'!$C$5</definedName></definedNames></workbook>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;

    fn build_archive(parts: &[(&str, &str)]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        let cursor = zip.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn test_primary_sheet_follows_active_tab() {
        let mut archive = build_archive(&[
            (WORKBOOK_PART, WORKBOOK),
            (WORKBOOK_RELS_PART, RELS),
            ("xl/worksheets/sheet1.xml", "<worksheet/>"),
            ("xl/worksheets/sheet2.xml", "<worksheet/>"),
        ]);

        let primary = primary_sheet(&mut archive).unwrap();
        assert_eq!(primary.name, "R&D");
        assert_eq!(primary.part, "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn test_active_chart_sheet_falls_back_to_first_worksheet() {
        let workbook = WORKBOOK.replace("activeTab=\"1\"", "activeTab=\"2\"");
        let mut archive = build_archive(&[
            (WORKBOOK_PART, workbook.as_str()),
            (WORKBOOK_RELS_PART, RELS),
            ("xl/worksheets/sheet1.xml", "<worksheet/>"),
            ("xl/worksheets/sheet2.xml", "<worksheet/>"),
        ]);

        let primary = primary_sheet(&mut archive).unwrap();
        assert_eq!(primary.name, "Notes");
        assert_eq!(primary.part, "xl/worksheets/sheet1.xml");
    }

    #[test]
    fn test_missing_worksheet_part() {
        let mut archive = build_archive(&[(WORKBOOK_PART, WORKBOOK), (WORKBOOK_RELS_PART, RELS)]);
        assert!(matches!(
            primary_sheet(&mut archive),
            Err(PackageError::MissingPart(part)) if part == "xl/worksheets/sheet2.xml"
        ));

        let mut archive = build_archive(&[("xl/worksheets/sheet1.xml", "<worksheet/>")]);
        assert!(matches!(
            primary_sheet(&mut archive),
            Err(PackageError::MissingPart(part)) if part == WORKBOOK_PART
        ));
    }

    #[test]
    fn test_full_calculation_is_inserted_in_schema_order() {
        let patched = String::from_utf8(force_full_calculation(WORKBOOK.as_bytes()).unwrap()).unwrap();
        assert!(patched.contains(
            "</definedNames><calcPr fullCalcOnLoad=\"1\"/></workbook>"
        ));

        let with_ext = WORKBOOK.replace("</workbook>", "<extLst/></workbook>");
        let patched = String::from_utf8(force_full_calculation(with_ext.as_bytes()).unwrap()).unwrap();
        assert!(patched.contains("<calcPr fullCalcOnLoad=\"1\"/><extLst/>"));
    }

    #[test]
    fn test_full_calculation_updates_existing_calc_pr() {
        let workbook = WORKBOOK.replace(
            "</workbook>",
            "<calcPr calcId=\"191029\" fullCalcOnLoad=\"0\"/></workbook>",
        );
        let patched = String::from_utf8(force_full_calculation(workbook.as_bytes()).unwrap()).unwrap();
        assert!(patched.contains("<calcPr calcId=\"191029\" fullCalcOnLoad=\"1\"/>"));
        assert_eq!(patched.matches("calcPr").count(), 1);
    }

    #[test]
    fn test_calc_chain_references_are_dropped() {
        let patched = String::from_utf8(without_calc_chain_relationship(RELS.as_bytes()).unwrap()).unwrap();
        assert!(!patched.contains("calcChain"));
        assert!(patched.contains("Id=\"rId1\""));
        assert!(patched.contains("Id=\"rId3\""));

        let content_types = r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="a"/><Override PartName="/xl/calcChain.xml" ContentType="b"/></Types>"#;
        let patched =
            String::from_utf8(without_calc_chain_override(content_types.as_bytes()).unwrap()).unwrap();
        assert_eq!(
            patched,
            r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="a"/></Types>"#
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(part_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(part_path("/xl/worksheets/sheet3.xml"), "xl/worksheets/sheet3.xml");
        assert_eq!(prefix_of(b"x:sheetData"), "x:");
        assert_eq!(prefix_of(b"sheetData"), "");
    }
}
